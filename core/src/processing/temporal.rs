use ndarray::{Array2, Zip};

use crate::math::stats::StatsHelper;
use crate::prelude::{
    check_shape, ProcessingStage, SensorShape, StageError, StageInput, StageMetadata,
    StageOutput, StageResult,
};

/// Exponential smoothing across frames: `y[t] = a * x[t] + (1 - a) * y[t-1]`.
pub struct TemporalFilter {
    alpha: f32,
    prior: Option<Array2<f32>>,
}

impl TemporalFilter {
    pub fn new(alpha: f32) -> Self {
        Self { alpha, prior: None }
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Last filtered map, if the filter has been initialized.
    pub fn state(&self) -> Option<&Array2<f32>> {
        self.prior.as_ref()
    }

    /// Blends `input` into the prior and returns the new filtered map.
    pub fn apply(&mut self, input: &Array2<f32>) -> StageResult<&Array2<f32>> {
        let prior = self
            .prior
            .as_mut()
            .ok_or_else(|| StageError::Internal("temporal filter not initialized".into()))?;
        if prior.dim() != input.dim() {
            return Err(StageError::InvalidInput(format!(
                "temporal input is {:?}, prior is {:?}",
                input.dim(),
                prior.dim()
            )));
        }
        let alpha = self.alpha;
        Zip::from(&mut *prior)
            .and(input)
            .for_each(|state, &sample| *state = alpha * sample + (1.0 - alpha) * *state);
        Ok(&*prior)
    }
}

impl ProcessingStage for TemporalFilter {
    fn initialize(&mut self, shape: &SensorShape) -> StageResult<()> {
        self.prior = Some(shape.zeros());
        Ok(())
    }

    fn execute(&mut self, input: StageInput) -> StageResult<StageOutput> {
        if let Some(prior) = &self.prior {
            let (rows, cols) = prior.dim();
            check_shape(&SensorShape::new(rows, cols), &input.map)?;
        }
        let map = self.apply(&input.map)?.clone();
        let metadata = StageMetadata {
            peak: Some(StatsHelper::peak(&map)),
            notes: vec![format!("temporal alpha {:.3}", self.alpha)],
        };
        Ok(StageOutput { map, metadata })
    }

    fn cleanup(&mut self) {
        self.prior = None;
    }
}
