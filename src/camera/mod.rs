mod adapter;
mod interface;
mod resolution;
mod synthetic;
#[cfg(test)]
mod tests;

pub use adapter::{CaptureAdapter, CaptureStats, Delivery, FrameSink, ProcessingGuard};
pub use interface::{CaptureSource, FrameCallback};
pub use resolution::{choose_optimal_size, MIN_PREVIEW_SIZE};
pub use synthetic::SyntheticCamera;
