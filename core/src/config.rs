use serde::{Deserialize, Serialize};

use crate::prelude::{SensorShape, StageError, StageResult};
use crate::publish::rate::MIN_TARGET_FPS;

/// Complete configuration for one pipeline instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub sensor: SensorConfig,
    pub calibration: CalibrationConfig,
    pub contact: ContactConfig,
    pub normalization: NormalizationPolicy,
    pub temporal: TemporalConfig,
    pub enhancement: EnhancementConfig,
    pub output: OutputConfig,
    pub telemetry: TelemetryConfig,
    pub reconnect: BackoffConfig,
}

/// Line protocol and array geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub rows: usize,
    pub cols: usize,
    /// Lines shorter than this (after trimming) mark a frame boundary.
    pub min_row_chars: usize,
    /// Sleep applied when the source has no data, in milliseconds.
    pub idle_sleep_ms: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            rows: 16,
            cols: 16,
            min_row_chars: 2,
            idle_sleep_ms: 1,
        }
    }
}

impl SensorConfig {
    pub fn shape(&self) -> SensorShape {
        SensorShape::new(self.rows, self.cols)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Number of startup frames folded into the median baseline.
    pub frames: usize,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self { frames: 30 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactConfig {
    /// Counts subtracted on top of the baseline before clipping at zero.
    pub threshold: f32,
    /// Contact values below this are zeroed. Zero disables the floor.
    pub min_significant: f32,
    /// Optional upper clip applied to the contact map.
    pub clip_max: Option<f32>,
    /// Idle drift coefficient. Zero disables drift tracking.
    pub drift_beta: f32,
}

impl Default for ContactConfig {
    fn default() -> Self {
        Self {
            threshold: 12.0,
            min_significant: 0.0,
            clip_max: None,
            drift_beta: 0.0,
        }
    }
}

/// Counts-to-intensity strategy, fixed for the lifetime of a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum NormalizationPolicy {
    FixedScale {
        abs_max: f32,
    },
    ForceBased {
        gain: f32,
        #[serde(default)]
        bias: f32,
        max_force: f32,
        #[serde(default)]
        auto_calibrate: bool,
        #[serde(default)]
        reference_force_n: f32,
    },
    PeakAdaptive {
        noise_scale: f32,
    },
}

impl Default for NormalizationPolicy {
    fn default() -> Self {
        NormalizationPolicy::PeakAdaptive { noise_scale: 60.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalConfig {
    pub alpha: f32,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self { alpha: 0.2 }
    }
}

/// Visualization-only enhancement stages. `None` disables a stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancementConfig {
    pub median_kernel: Option<usize>,
    pub gaussian_sigma: Option<f32>,
    pub unsharp_amount: Option<f32>,
}

impl Default for EnhancementConfig {
    fn default() -> Self {
        Self {
            median_kernel: Some(3),
            gaussian_sigma: Some(0.6),
            unsharp_amount: Some(0.6),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mirror {
    None,
    /// Top-bottom flip.
    Vertical,
    /// Left-right flip.
    Horizontal,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    Nearest,
    Linear,
    Cubic,
    Lanczos,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub mirror: Mirror,
    /// Square output edge in pixels; `None` keeps one pixel per taxel.
    pub size: Option<u32>,
    pub interpolation: Interpolation,
    pub border_px: u32,
    pub jpeg_quality: u8,
    pub target_fps: f32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            mirror: Mirror::Vertical,
            size: Some(512),
            interpolation: Interpolation::Nearest,
            border_px: 1,
            jpeg_quality: 85,
            target_fps: 30.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportMode {
    Off,
    Stats,
    Matrix,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureUnit {
    Pa,
    Kpa,
}

/// Linear force model used for the force/pressure report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForceReportConfig {
    /// Newtons per sensor count.
    pub gain: f32,
    pub bias: f32,
    pub taxel_area_m2: f32,
    pub pressure_unit: PressureUnit,
}

impl Default for ForceReportConfig {
    fn default() -> Self {
        Self {
            gain: 0.02,
            bias: 0.0,
            taxel_area_m2: 9e-6,
            pressure_unit: PressureUnit::Kpa,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub report_every: u64,
    pub report_mode: ReportMode,
    pub force: Option<ForceReportConfig>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            report_every: 10,
            report_mode: ReportMode::Stats,
            force: Some(ForceReportConfig::default()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub initial_ms: u64,
    pub max_ms: u64,
    /// Consecutive failed sessions tolerated before the producer stops.
    pub max_attempts: Option<u32>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_ms: 250,
            max_ms: 5_000,
            max_attempts: None,
        }
    }
}

impl BackoffConfig {
    /// Delay before reconnect attempt `attempt` (1-based).
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        let shift = attempt.saturating_sub(1).min(16);
        self.initial_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_ms.max(self.initial_ms))
    }
}

fn invalid(message: impl Into<String>) -> StageError {
    StageError::InvalidConfig(message.into())
}

fn finite_non_negative(name: &str, value: f32) -> StageResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be finite and >= 0, got {value}")))
    }
}

fn finite_positive(name: &str, value: f32) -> StageResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be finite and > 0, got {value}")))
    }
}

impl PipelineConfig {
    pub fn shape(&self) -> SensorShape {
        self.sensor.shape()
    }

    /// Rejects configurations the pipeline cannot run with.
    pub fn validate(&self) -> StageResult<()> {
        if self.sensor.rows == 0 || self.sensor.cols == 0 {
            return Err(invalid(format!(
                "sensor shape must be positive, got {}x{}",
                self.sensor.rows, self.sensor.cols
            )));
        }
        if self.sensor.min_row_chars == 0 {
            return Err(invalid(
                "sensor.min_row_chars must be at least 1 so blank lines end a frame",
            ));
        }
        if self.calibration.frames == 0 {
            return Err(invalid("calibration.frames must be at least 1"));
        }

        finite_non_negative("contact.threshold", self.contact.threshold)?;
        finite_non_negative("contact.min_significant", self.contact.min_significant)?;
        if let Some(clip_max) = self.contact.clip_max {
            finite_positive("contact.clip_max", clip_max)?;
        }
        let beta = self.contact.drift_beta;
        if !(0.0..=1.0).contains(&beta) {
            return Err(invalid(format!("contact.drift_beta must be in [0, 1], got {beta}")));
        }

        match &self.normalization {
            NormalizationPolicy::FixedScale { abs_max } => {
                finite_positive("normalization.abs_max", *abs_max)?
            }
            NormalizationPolicy::ForceBased {
                gain,
                bias,
                max_force,
                auto_calibrate,
                reference_force_n,
            } => {
                finite_non_negative("normalization.gain", *gain)?;
                if !bias.is_finite() {
                    return Err(invalid("normalization.bias must be finite"));
                }
                finite_positive("normalization.max_force", *max_force)?;
                if *auto_calibrate {
                    finite_positive("normalization.reference_force_n", *reference_force_n)?;
                }
            }
            NormalizationPolicy::PeakAdaptive { noise_scale } => {
                finite_non_negative("normalization.noise_scale", *noise_scale)?
            }
        }

        let alpha = self.temporal.alpha;
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(invalid(format!("temporal.alpha must be in (0, 1], got {alpha}")));
        }

        if let Some(kernel) = self.enhancement.median_kernel {
            if kernel == 0 || kernel % 2 == 0 {
                return Err(invalid(format!(
                    "enhancement.median_kernel must be odd, got {kernel}"
                )));
            }
        }
        if let Some(sigma) = self.enhancement.gaussian_sigma {
            finite_positive("enhancement.gaussian_sigma", sigma)?;
        }
        if let Some(amount) = self.enhancement.unsharp_amount {
            finite_non_negative("enhancement.unsharp_amount", amount)?;
        }

        finite_positive("output.target_fps", self.output.target_fps)?;
        if self.output.target_fps < MIN_TARGET_FPS {
            return Err(invalid(format!(
                "output.target_fps must be at least {}, got {}",
                MIN_TARGET_FPS, self.output.target_fps
            )));
        }
        if self.output.size == Some(0) {
            return Err(invalid("output.size must be positive"));
        }
        if !(1..=100).contains(&self.output.jpeg_quality) {
            return Err(invalid(format!(
                "output.jpeg_quality must be in 1..=100, got {}",
                self.output.jpeg_quality
            )));
        }

        if let Some(force) = &self.telemetry.force {
            finite_positive("telemetry.force.taxel_area_m2", force.taxel_area_m2)?;
        }
        if self.reconnect.initial_ms == 0 {
            return Err(invalid("reconnect.initial_ms must be positive"));
        }
        Ok(())
    }
}
