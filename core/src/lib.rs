//! Acquisition and contact-map processing core for the tactile viewer.
//!
//! A single producer turns raw device lines into baseline-corrected,
//! normalized and temporally smoothed maps; any number of consumers render
//! the latest map at their own pace through [`publish::FramePublisher`].

pub mod acquisition;
pub mod config;
pub mod math;
pub mod pipeline;
pub mod prelude;
pub mod processing;
pub mod publish;
pub mod telemetry;

pub use config::PipelineConfig;
pub use pipeline::{Pipeline, PipelineHandle, PipelineStatus, Producer};
pub use prelude::{ProcessingStage, SensorShape, StageError, StageInput, StageOutput, StageResult};
pub use publish::{FramePublisher, OutputFrame};
