pub mod camera;
pub mod config;
pub mod controller;
pub mod encoder;
pub mod error;
pub mod events;
pub mod frame;
pub mod frame_slot;
pub mod pose;
pub mod protocol;
pub mod transport;

pub use camera::{CaptureAdapter, CaptureSource, Delivery, SyntheticCamera};
pub use config::XrLinkConfig;
pub use controller::{ShutdownReason, StreamController, StreamState, VideoRoute};
pub use encoder::{EncodedAccessUnit, EncoderFactory, EncoderState, VideoEncoder};
pub use error::{Result, XrLinkError};
pub use events::{EventBus, EventFilter, EventReceiver, StreamEvent};
pub use frame::{FrameBuffer, PixelFormat, Plane, RawFrame};
pub use frame_slot::FrameSlot;
pub use pose::{PoseAssembler, PoseSample, PoseSource, SensorSource, StaticPoseSource, SyntheticImu};
pub use protocol::{WireFormat, WireFrameHeader};
pub use transport::{TransportMode, TransportPreference, TransportSession};
