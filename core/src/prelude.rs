use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::acquisition::SourceError;

/// Dimensions of the taxel array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorShape {
    pub rows: usize,
    pub cols: usize,
}

impl SensorShape {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    pub fn dim(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn taxels(&self) -> usize {
        self.rows * self.cols
    }

    pub fn zeros(&self) -> Array2<f32> {
        Array2::zeros(self.dim())
    }

    pub fn matches(&self, map: &Array2<f32>) -> bool {
        map.dim() == self.dim()
    }
}

/// Input payload for a map stage.
#[derive(Debug, Clone)]
pub struct StageInput {
    pub map: Array2<f32>,
    pub sequence: u64,
}

/// Output produced by each map stage.
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub map: Array2<f32>,
    pub metadata: StageMetadata,
}

/// Metadata used for chaining stages and telemetry.
#[derive(Debug, Clone, Default)]
pub struct StageMetadata {
    pub peak: Option<f32>,
    pub notes: Vec<String>,
}

/// Common error type for stage execution.
#[derive(thiserror::Error, Debug)]
pub enum StageError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("baseline not calibrated")]
    NotCalibrated,
    #[error("render failure: {0}")]
    Render(String),
    #[error("device failure: {0}")]
    Source(#[from] SourceError),
    #[error("internal failure: {0}")]
    Internal(String),
}

pub type StageResult<T> = Result<T, StageError>;

/// Trait describing the map-to-map stages that follow contact extraction.
pub trait ProcessingStage {
    fn initialize(&mut self, shape: &SensorShape) -> StageResult<()>;
    fn execute(&mut self, input: StageInput) -> StageResult<StageOutput>;
    fn cleanup(&mut self);
}

pub(crate) fn check_shape(shape: &SensorShape, map: &Array2<f32>) -> StageResult<()> {
    if shape.matches(map) {
        Ok(())
    } else {
        let (rows, cols) = map.dim();
        Err(StageError::InvalidInput(format!(
            "expected {}x{} map, got {}x{}",
            shape.rows, shape.cols, rows, cols
        )))
    }
}
