mod adapter;
mod backend;
#[cfg(all(feature = "gstreamer", target_os = "linux"))]
mod gst;
pub mod mock;
mod session;

pub use adapter::{EncoderState, EncoderStateCell, VideoEncoder};
pub use backend::{
    AccessUnitKind, EncodedAccessUnit, EncoderBackend, EncoderCallback, EncoderFactory,
    EncoderFormat, EncoderInput, OutputFormat, START_CODE,
};
#[cfg(all(feature = "gstreamer", target_os = "linux"))]
pub use gst::{GstEncoderBackend, GstEncoderFactory};
pub use session::EncoderSession;
