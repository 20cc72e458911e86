pub mod filters;
pub mod matrix;
pub mod stats;

pub use filters::FilterHelper;
pub use matrix::MatrixHelper;
pub use stats::StatsHelper;
