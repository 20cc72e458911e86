use ndarray::Array2;

use crate::prelude::{SensorShape, StageError, StageResult};

/// One full sample of raw counts. Always exactly `rows x cols`.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    counts: Array2<u32>,
}

impl Frame {
    /// Builds a frame from parsed rows, rejecting any shape mismatch.
    pub fn from_rows(shape: &SensorShape, rows: &[Vec<u32>]) -> StageResult<Self> {
        if rows.len() != shape.rows {
            return Err(StageError::InvalidInput(format!(
                "expected {} rows, got {}",
                shape.rows,
                rows.len()
            )));
        }
        if let Some((index, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != shape.cols) {
            return Err(StageError::InvalidInput(format!(
                "row {} has {} values, expected {}",
                index,
                row.len(),
                shape.cols
            )));
        }
        let flat: Vec<u32> = rows.iter().flatten().copied().collect();
        let counts = Array2::from_shape_vec(shape.dim(), flat)
            .map_err(|err| StageError::Internal(err.to_string()))?;
        Ok(Self { counts })
    }

    pub fn from_array(counts: Array2<u32>) -> Self {
        Self { counts }
    }

    /// Uniform frame, mostly useful for calibration fixtures.
    pub fn filled(shape: &SensorShape, value: u32) -> Self {
        Self {
            counts: Array2::from_elem(shape.dim(), value),
        }
    }

    pub fn shape(&self) -> SensorShape {
        let (rows, cols) = self.counts.dim();
        SensorShape::new(rows, cols)
    }

    pub fn counts(&self) -> &Array2<u32> {
        &self.counts
    }

    pub fn to_f32(&self) -> Array2<f32> {
        self.counts.mapv(|count| count as f32)
    }
}
