use log::info;
use ndarray::Array2;

use crate::acquisition::Frame;
use crate::math::stats::StatsHelper;
use crate::prelude::{SensorShape, StageError, StageResult};

/// Collects the first `required` frames and folds them into a per-taxel
/// median baseline.
pub struct Calibrator {
    shape: SensorShape,
    required: usize,
    samples: Vec<Array2<f32>>,
}

impl Calibrator {
    pub fn new(shape: SensorShape, required: usize) -> Self {
        Self {
            shape,
            required: required.max(1),
            samples: Vec::with_capacity(required),
        }
    }

    pub fn collected(&self) -> usize {
        self.samples.len()
    }

    pub fn required(&self) -> usize {
        self.required
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }

    /// Adds a frame; returns the baseline once enough frames were seen.
    pub fn push(&mut self, frame: &Frame) -> StageResult<Option<Array2<f32>>> {
        if frame.shape() != self.shape {
            return Err(StageError::InvalidInput(format!(
                "calibration frame is {}x{}, expected {}x{}",
                frame.shape().rows,
                frame.shape().cols,
                self.shape.rows,
                self.shape.cols
            )));
        }
        self.samples.push(frame.to_f32());
        if self.samples.len() < self.required {
            return Ok(None);
        }

        let baseline = StatsHelper::median_stack(&self.samples)
            .ok_or_else(|| StageError::Internal("empty calibration stack".into()))?;
        self.samples.clear();
        info!(
            "Calibration complete over {} frames (mean baseline {:.2})",
            self.required,
            StatsHelper::mean(&baseline)
        );
        Ok(Some(baseline))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_frames_yield_that_frame() {
        let shape = SensorShape::new(3, 4);
        let mut calibrator = Calibrator::new(shape, 5);
        let frame = Frame::filled(&shape, 37);
        for _ in 0..4 {
            assert!(calibrator.push(&frame).unwrap().is_none());
        }
        let baseline = calibrator.push(&frame).unwrap().unwrap();
        assert_eq!(baseline, frame.to_f32());
        assert_eq!(calibrator.collected(), 0);
    }

    #[test]
    fn median_rejects_transient_spike() {
        let shape = SensorShape::new(1, 1);
        let mut calibrator = Calibrator::new(shape, 3);
        calibrator.push(&Frame::filled(&shape, 10)).unwrap();
        calibrator.push(&Frame::filled(&shape, 900)).unwrap();
        let baseline = calibrator.push(&Frame::filled(&shape, 12)).unwrap().unwrap();
        assert_eq!(baseline[[0, 0]], 12.0);
    }

    #[test]
    fn wrong_shape_is_rejected() {
        let mut calibrator = Calibrator::new(SensorShape::new(2, 2), 1);
        let frame = Frame::filled(&SensorShape::new(2, 3), 0);
        assert!(calibrator.push(&frame).is_err());
        assert_eq!(calibrator.collected(), 0);
    }
}
