//! Device-facing side of the pipeline: raw lines in, validated frames out.

pub mod frame;
pub mod reader;
pub mod source;

pub use frame::Frame;
pub use reader::{FrameReader, ReaderStats};
pub use source::{BufLineSource, LineRead, LineSource, SourceError};
