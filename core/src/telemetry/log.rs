use log::info;
use ndarray::Array2;

use crate::config::{ReportMode, TelemetryConfig};
use crate::math::matrix::MatrixHelper;
use crate::math::stats::StatsHelper;
use crate::processing::force::ForceStats;

/// Periodic human-readable frame reports through the `log` facade.
pub struct LogManager {
    mode: ReportMode,
    every: u64,
}

impl LogManager {
    pub fn new() -> Self {
        Self::from_config(&TelemetryConfig::default())
    }

    pub fn from_config(config: &TelemetryConfig) -> Self {
        Self {
            mode: config.report_mode,
            every: config.report_every.max(1),
        }
    }

    pub fn record(&self, message: &str) {
        info!("{}", message);
    }

    pub fn wants_report(&self, frame_index: u64) -> bool {
        self.mode != ReportMode::Off && frame_index > 0 && frame_index % self.every == 0
    }

    /// Emits the report for `frame_index` when it falls on the reporting period.
    pub fn report_frame(
        &self,
        frame_index: u64,
        contact_peak: f32,
        normalized: &Array2<f32>,
        force: Option<&ForceStats>,
    ) {
        if !self.wants_report(frame_index) {
            return;
        }
        match self.mode {
            ReportMode::Off => {}
            ReportMode::Stats => {
                self.record(&format!(
                    "frame {}: max={:.1}, mean={:.3}",
                    frame_index,
                    contact_peak,
                    StatsHelper::mean(normalized)
                ));
                if let Some(force) = force {
                    let unit = force.pressure_unit.label();
                    self.record(&format!(
                        "force: total={:.3} N, peak={:.3} N, mean={:.3} N; pressure: peak={:.2} {}, mean={:.2} {}",
                        force.total_n,
                        force.peak_n,
                        force.mean_n,
                        force.peak_pressure,
                        unit,
                        force.mean_pressure,
                        unit
                    ));
                }
            }
            ReportMode::Matrix => {
                self.record(&format!("frame {} intensity map:", frame_index));
                for line in format_matrix(normalized) {
                    self.record(&line);
                }
            }
        }
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new()
    }
}

/// One fixed-width line of 0..255 intensities per row.
pub fn format_matrix(map: &Array2<f32>) -> Vec<String> {
    MatrixHelper::to_u8(map.view())
        .rows()
        .into_iter()
        .map(|row| {
            row.iter()
                .map(|v| format!("{:>3}", v))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}
