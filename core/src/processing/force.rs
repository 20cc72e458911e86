use ndarray::Array2;
use serde::Serialize;

use crate::config::{ForceReportConfig, PressureUnit};
use crate::math::stats::StatsHelper;

/// Linear per-taxel force model: `force = max(0, gain * counts + bias)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForceModel {
    pub gain: f32,
    pub bias: f32,
}

impl ForceModel {
    pub fn new(gain: f32, bias: f32) -> Self {
        Self { gain, bias }
    }

    pub fn force(&self, counts: f32) -> f32 {
        (self.gain * counts + self.bias).max(0.0)
    }

    pub fn force_map(&self, contact: &Array2<f32>) -> Array2<f32> {
        contact.mapv(|counts| self.force(counts))
    }
}

/// Force and pressure summary of one contact map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForceStats {
    pub total_n: f32,
    pub peak_n: f32,
    pub mean_n: f32,
    pub peak_pressure: f32,
    pub mean_pressure: f32,
    pub pressure_unit: PressureUnit,
}

impl PressureUnit {
    pub fn label(&self) -> &'static str {
        match self {
            PressureUnit::Pa => "Pa",
            PressureUnit::Kpa => "kPa",
        }
    }

    fn scale(&self) -> f32 {
        match self {
            PressureUnit::Pa => 1.0,
            PressureUnit::Kpa => 1e-3,
        }
    }
}

/// Computes [`ForceStats`] for the telemetry report.
pub struct ForceEstimator {
    model: ForceModel,
    taxel_area_m2: f32,
    unit: PressureUnit,
}

impl ForceEstimator {
    pub fn new(config: &ForceReportConfig) -> Self {
        Self {
            model: ForceModel::new(config.gain, config.bias),
            taxel_area_m2: config.taxel_area_m2,
            unit: config.pressure_unit,
        }
    }

    pub fn estimate(&self, contact: &Array2<f32>) -> ForceStats {
        let forces = self.model.force_map(contact);
        let peak_n = StatsHelper::peak(&forces);
        let mean_n = StatsHelper::mean(&forces);
        let to_pressure = self.unit.scale() / self.taxel_area_m2;
        ForceStats {
            total_n: forces.sum(),
            peak_n,
            mean_n,
            peak_pressure: peak_n * to_pressure,
            mean_pressure: mean_n * to_pressure,
            pressure_unit: self.unit,
        }
    }
}
