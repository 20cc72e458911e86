pub mod calibration;
pub mod contact;
pub mod force;
pub mod normalize;
pub mod spatial;
pub mod temporal;

pub use calibration::Calibrator;
pub use contact::{ContactOutput, ContactProcessor};
pub use force::{ForceEstimator, ForceModel, ForceStats};
pub use normalize::Normalizer;
pub use spatial::SpatialEnhancer;
pub use temporal::TemporalFilter;
