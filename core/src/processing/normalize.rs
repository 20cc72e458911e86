//! Counts-to-intensity normalization.
//!
//! Exactly one [`Strategy`] is active per pipeline. The peak-adaptive policy
//! rescales every frame by its own peak once contact is detected, so the
//! resulting intensities are not comparable across frames: a light touch and
//! a hard press both reach 1.0. That is the intended trade for contrast at
//! low amplitudes; use fixed-scale or force-based normalization when
//! absolute comparison matters.

use log::info;
use ndarray::Array2;

use crate::config::NormalizationPolicy;
use crate::math::stats::StatsHelper;
use crate::prelude::{
    check_shape, ProcessingStage, SensorShape, StageInput, StageMetadata, StageOutput,
    StageResult,
};
use crate::processing::force::ForceModel;

/// Peak counts that arm the one-time force gain calibration.
const AUTO_GAIN_TRIGGER_COUNTS: f32 = 1.0;

#[derive(Debug, Clone, PartialEq)]
enum GainState {
    Fixed,
    AwaitingReference { reference_force_n: f32 },
    Calibrated,
}

#[derive(Debug, Clone, PartialEq)]
enum Strategy {
    FixedScale {
        abs_max: f32,
    },
    ForceBased {
        model: ForceModel,
        max_force: f32,
        gain_state: GainState,
    },
    PeakAdaptive {
        noise_scale: f32,
        threshold: f32,
    },
}

/// Maps a non-negative contact map into `[0, 1]`.
pub struct Normalizer {
    strategy: Strategy,
    shape: Option<SensorShape>,
}

fn nonzero(denominator: f32) -> f32 {
    if denominator == 0.0 {
        1.0
    } else {
        denominator
    }
}

impl Normalizer {
    /// `threshold` is the contact threshold, used by the peak-adaptive policy
    /// to decide whether a frame carries contact or only noise.
    pub fn new(policy: &NormalizationPolicy, threshold: f32) -> Self {
        let strategy = match *policy {
            NormalizationPolicy::FixedScale { abs_max } => Strategy::FixedScale { abs_max },
            NormalizationPolicy::ForceBased {
                gain,
                bias,
                max_force,
                auto_calibrate,
                reference_force_n,
            } => Strategy::ForceBased {
                model: ForceModel::new(gain, bias),
                max_force,
                gain_state: if auto_calibrate {
                    GainState::AwaitingReference { reference_force_n }
                } else {
                    GainState::Fixed
                },
            },
            NormalizationPolicy::PeakAdaptive { noise_scale } => Strategy::PeakAdaptive {
                noise_scale,
                threshold,
            },
        };
        Self {
            strategy,
            shape: None,
        }
    }

    pub fn policy_name(&self) -> &'static str {
        match self.strategy {
            Strategy::FixedScale { .. } => "fixed_scale",
            Strategy::ForceBased { .. } => "force_based",
            Strategy::PeakAdaptive { .. } => "peak_adaptive",
        }
    }

    /// Current counts-to-newton gain for the force policy.
    pub fn force_gain(&self) -> Option<f32> {
        match &self.strategy {
            Strategy::ForceBased { model, .. } => Some(model.gain),
            _ => None,
        }
    }

    pub fn normalize(&mut self, contact: &Array2<f32>) -> Array2<f32> {
        match &mut self.strategy {
            Strategy::FixedScale { abs_max } => {
                let scale = nonzero(*abs_max);
                contact.mapv(|v| (v / scale).clamp(0.0, 1.0))
            }
            Strategy::ForceBased {
                model,
                max_force,
                gain_state,
            } => {
                if let GainState::AwaitingReference { reference_force_n } = *gain_state {
                    let peak = StatsHelper::peak(contact);
                    if peak > AUTO_GAIN_TRIGGER_COUNTS {
                        // Reference load spread over the contact patch.
                        model.gain = reference_force_n / nonzero(contact.sum());
                        *gain_state = GainState::Calibrated;
                        info!(
                            "Force gain calibrated to {:.5} N/count from {:.2} N reference",
                            model.gain, reference_force_n
                        );
                    }
                }
                let max_force = nonzero(*max_force);
                let model = *model;
                contact.mapv(|v| (model.force(v) / max_force).clamp(0.0, 1.0))
            }
            Strategy::PeakAdaptive {
                noise_scale,
                threshold,
            } => {
                let peak = StatsHelper::peak(contact);
                let denominator = if peak < *threshold { *noise_scale } else { peak };
                let denominator = nonzero(denominator);
                contact.mapv(|v| (v / denominator).clamp(0.0, 1.0))
            }
        }
    }
}

impl ProcessingStage for Normalizer {
    fn initialize(&mut self, shape: &SensorShape) -> StageResult<()> {
        self.shape = Some(*shape);
        Ok(())
    }

    fn execute(&mut self, input: StageInput) -> StageResult<StageOutput> {
        if let Some(shape) = &self.shape {
            check_shape(shape, &input.map)?;
        }
        let map = self.normalize(&input.map);
        let metadata = StageMetadata {
            peak: Some(StatsHelper::peak(&map)),
            notes: vec![format!("{} normalization", self.policy_name())],
        };
        Ok(StageOutput { map, metadata })
    }

    fn cleanup(&mut self) {
        self.shape = None;
    }
}
