//! Binary framing for the video and sensor channels.
//!
//! Video channel, one frame (all integers big-endian):
//! ```text
//! ┌─────────┬──────────┬────────────┬──────────┬─────────┬──────────┬─────────┬──────────────┐
//! │ format  │ keyframe │ row stride │  height  │  width  │ length N │ payload │   reserved   │
//! │ 2 bytes │  1 byte  │  2 bytes   │ 2 bytes  │ 2 bytes │ 4 bytes  │ N bytes │ 48 bytes (0) │
//! └─────────┴──────────┴────────────┴──────────┴─────────┴──────────┴─────────┴──────────────┘
//! ```
//!
//! Sensor channel: 25 big-endian `f32` (pose matrix, accelerometer,
//! gyroscope, magnetometer) with no header.

mod header;
mod packing;
mod sensor;

pub use header::{
    decode_video_frame, encode_video_frame, read_video_frame, WireFormat, WireFrameHeader,
    HEADER_LEN, SENSOR_PADDING_LEN,
};
pub use packing::{pack_encoder_input, pack_frame};
pub use sensor::{decode_sensor_sample, encode_sensor_sample, PoseSample, SENSOR_SAMPLE_LEN};
