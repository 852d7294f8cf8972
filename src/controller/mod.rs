mod lifecycle;
mod pipeline;
mod runtime;
mod types;


pub use lifecycle::StreamController;
pub use pipeline::FramePipeline;
pub use types::{ShutdownReason, StreamState, VideoRoute};
