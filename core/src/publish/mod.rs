pub mod publisher;
pub mod rate;
pub mod render;

pub use publisher::{FramePublisher, FrameSubscriber, OutputFrame};
pub use rate::RateLimiter;
pub use render::FrameRenderer;
