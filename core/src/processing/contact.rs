use ndarray::{Array2, Zip};

use crate::acquisition::Frame;
use crate::config::ContactConfig;
use crate::prelude::{check_shape, SensorShape, StageResult};

/// Result of one contact extraction cycle.
#[derive(Debug, Clone)]
pub struct ContactOutput {
    pub contact: Array2<f32>,
    /// True when the idle-drift rule updated the baseline this cycle.
    pub drift_applied: bool,
}

/// Owns the baseline after calibration and turns frames into contact maps.
pub struct ContactProcessor {
    shape: SensorShape,
    baseline: Array2<f32>,
    threshold: f32,
    min_significant: f32,
    clip_max: f32,
    drift_beta: f32,
}

impl ContactProcessor {
    pub fn new(baseline: Array2<f32>, config: &ContactConfig) -> Self {
        let (rows, cols) = baseline.dim();
        Self {
            shape: SensorShape::new(rows, cols),
            baseline,
            threshold: config.threshold,
            min_significant: config.min_significant,
            clip_max: config.clip_max.unwrap_or(f32::INFINITY),
            drift_beta: config.drift_beta,
        }
    }

    pub fn baseline(&self) -> &Array2<f32> {
        &self.baseline
    }

    /// `max(0, frame - baseline - threshold)`, floored, then idle drift.
    pub fn process(&mut self, frame: &Frame) -> StageResult<ContactOutput> {
        let raw = frame.to_f32();
        check_shape(&self.shape, &raw)?;

        let mut contact = &raw - &self.baseline;
        let (threshold, floor, ceiling) = (self.threshold, self.min_significant, self.clip_max);
        contact.mapv_inplace(|v| {
            let value = (v - threshold).clamp(0.0, ceiling);
            if value < floor {
                0.0
            } else {
                value
            }
        });

        let drift_applied = self.drift_beta > 0.0 && contact.sum() == 0.0;
        if drift_applied {
            let beta = self.drift_beta;
            Zip::from(&mut self.baseline)
                .and(&raw)
                .for_each(|base, &sample| *base = (1.0 - beta) * *base + beta * sample);
        }

        Ok(ContactOutput {
            contact,
            drift_applied,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn config(threshold: f32, beta: f32) -> ContactConfig {
        ContactConfig {
            threshold,
            drift_beta: beta,
            ..Default::default()
        }
    }

    #[test]
    fn contact_is_never_negative() {
        let shape = SensorShape::new(2, 2);
        let baseline = Array2::from_elem(shape.dim(), 100.0);
        let mut processor = ContactProcessor::new(baseline, &config(5.0, 0.0));
        let frame = Frame::from_rows(&shape, &[vec![0, 104], vec![106, 300]]).unwrap();
        let output = processor.process(&frame).unwrap();
        assert!(output.contact.iter().all(|&v| v >= 0.0));
        assert_eq!(output.contact[[1, 0]], 1.0);
        assert_eq!(output.contact[[1, 1]], 195.0);
    }

    #[test]
    fn idle_drift_moves_baseline_toward_frame() {
        let shape = SensorShape::new(2, 2);
        let mut processor = ContactProcessor::new(shape.zeros(), &config(10.0, 0.2));
        let output = processor.process(&Frame::filled(&shape, 10)).unwrap();
        assert!(output.drift_applied);
        assert_eq!(output.contact.sum(), 0.0);
        assert!(processor.baseline().iter().all(|&b| (b - 2.0).abs() < 1e-6));
    }

    #[test]
    fn contact_freezes_baseline() {
        let shape = SensorShape::new(1, 2);
        let mut processor = ContactProcessor::new(shape.zeros(), &config(10.0, 0.5));
        let frame = Frame::from_rows(&shape, &[vec![0, 40]]).unwrap();
        let output = processor.process(&frame).unwrap();
        assert!(!output.drift_applied);
        assert_eq!(processor.baseline(), &shape.zeros());
    }

    #[test]
    fn zero_beta_disables_drift() {
        let shape = SensorShape::new(1, 1);
        let mut processor = ContactProcessor::new(shape.zeros(), &config(10.0, 0.0));
        let output = processor.process(&Frame::filled(&shape, 3)).unwrap();
        assert!(!output.drift_applied);
        assert_eq!(processor.baseline()[[0, 0]], 0.0);
    }

    #[test]
    fn ghost_values_below_floor_are_zeroed() {
        let shape = SensorShape::new(1, 3);
        let contact = ContactConfig {
            threshold: 0.0,
            min_significant: 4.0,
            clip_max: Some(50.0),
            drift_beta: 0.0,
        };
        let mut processor = ContactProcessor::new(shape.zeros(), &contact);
        let frame = Frame::from_rows(&shape, &[vec![3, 4, 90]]).unwrap();
        let output = processor.process(&frame).unwrap();
        assert_eq!(output.contact.row(0).to_vec(), vec![0.0, 4.0, 50.0]);
    }

    #[test]
    fn mismatched_frame_leaves_baseline_untouched() {
        let shape = SensorShape::new(2, 2);
        let mut processor = ContactProcessor::new(shape.zeros(), &config(10.0, 0.2));
        let frame = Frame::filled(&SensorShape::new(3, 2), 10);
        assert!(processor.process(&frame).is_err());
        assert_eq!(processor.baseline(), &shape.zeros());
    }
}
