use crate::error::Result;
use crate::frame::RawFrame;
use async_trait::async_trait;
use std::sync::Arc;

/// Called once per hardware frame delivery, on the source's own context
pub type FrameCallback = Arc<dyn Fn(RawFrame) + Send + Sync>;

/// Camera hardware abstraction
#[async_trait]
pub trait CaptureSource: Send + Sync {
    /// Begin delivering frames to `callback`
    async fn start(&self, callback: FrameCallback) -> Result<()>;

    /// Stop delivering frames. No callback runs after this returns.
    async fn stop(&self) -> Result<()>;

    /// Capture size in pixels
    fn resolution(&self) -> (u32, u32);

    fn is_capturing(&self) -> bool;
}
