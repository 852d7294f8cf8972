use crate::config::EncoderConfig;
use crate::error::EncoderError;
use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use std::time::Duration;

/// Annex-B start code every configuration unit begins with
pub const START_CODE: [u8; 4] = [0, 0, 0, 1];

/// What the encoder is asked to produce
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderFormat {
    pub mime: String,
    pub width: u32,
    pub height: u32,
    pub bitrate: u32,
    pub frame_rate: u32,
    pub i_frame_interval_secs: u32,
    /// Ask the codec not to hold frames back for reordering
    pub low_latency: bool,
}

impl EncoderFormat {
    pub fn new(config: &EncoderConfig, width: u32, height: u32, bitrate: u32) -> Self {
        Self {
            mime: config.mime.clone(),
            width,
            height,
            bitrate,
            frame_rate: config.frame_rate,
            i_frame_interval_secs: config.i_frame_interval_secs,
            low_latency: true,
        }
    }

    /// Bytes of one packed YUV 4:2:0 input frame
    pub fn input_frame_len(&self) -> usize {
        let luma = self.width as usize * self.height as usize;
        luma + luma / 2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessUnitKind {
    /// Decoder parameter sets
    Config,
    /// Coded picture, `keyframe` when the codec marked it a sync point
    Picture { keyframe: bool },
    EndOfStream,
}

/// One output chunk of the encoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAccessUnit {
    pub kind: AccessUnitKind,
    pub data: Bytes,
    /// Presentation time in microseconds since encoder start
    pub pts_us: u64,
}

impl EncodedAccessUnit {
    pub fn config(data: impl Into<Bytes>, pts_us: u64) -> Self {
        Self {
            kind: AccessUnitKind::Config,
            data: data.into(),
            pts_us,
        }
    }

    pub fn picture(data: impl Into<Bytes>, keyframe: bool, pts_us: u64) -> Self {
        Self {
            kind: AccessUnitKind::Picture { keyframe },
            data: data.into(),
            pts_us,
        }
    }

    pub fn end_of_stream(pts_us: u64) -> Self {
        Self {
            kind: AccessUnitKind::EndOfStream,
            data: Bytes::new(),
            pts_us,
        }
    }

    pub fn is_config(&self) -> bool {
        self.kind == AccessUnitKind::Config
    }

    /// Configuration units count as sync points for the receiver
    pub fn is_keyframe(&self) -> bool {
        match self.kind {
            AccessUnitKind::Config => true,
            AccessUnitKind::Picture { keyframe } => keyframe,
            AccessUnitKind::EndOfStream => false,
        }
    }

    pub fn starts_with_start_code(&self) -> bool {
        self.data.starts_with(&START_CODE)
    }
}

/// Output format notification carrying the two parameter-set blobs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputFormat {
    pub csd0: Option<Bytes>,
    pub csd1: Option<Bytes>,
}

impl OutputFormat {
    /// Concatenated parameter sets, only when both are present
    pub fn configuration_unit(&self) -> Option<Bytes> {
        match (&self.csd0, &self.csd1) {
            (Some(csd0), Some(csd1)) => {
                let mut unit = BytesMut::with_capacity(csd0.len() + csd1.len());
                unit.extend_from_slice(csd0);
                unit.extend_from_slice(csd1);
                Some(unit.freeze())
            }
            _ => None,
        }
    }
}

/// Answer to an input-ready callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderInput {
    Frame { data: Bytes, pts_us: u64 },
    /// Nothing to encode yet; the codec should ask again later
    NotReady,
    EndOfStream,
}

/// Push-mode handler invoked from the codec's own threads
pub trait EncoderCallback: Send + Sync {
    /// The codec has a free input buffer
    fn on_input_ready(&self) -> EncoderInput;

    fn on_output_ready(&self, unit: EncodedAccessUnit);

    fn on_format_changed(&self, format: OutputFormat);

    fn on_error(&self, error: EncoderError);
}

/// A concrete hardware or software encoder
pub trait EncoderBackend: Send {
    fn name(&self) -> &str;

    fn configure(&mut self, format: &EncoderFormat) -> Result<(), EncoderError>;

    /// Install or remove the push-mode handler. Must be called before
    /// `start`; backends without push support return `Unsupported`.
    fn set_callback(
        &mut self,
        callback: Option<Arc<dyn EncoderCallback>>,
    ) -> Result<(), EncoderError>;

    fn start(&mut self) -> Result<(), EncoderError>;

    fn stop(&mut self) -> Result<(), EncoderError>;

    /// Submit one input frame, waiting at most `timeout` for a free input
    /// buffer. `Ok(false)` means the frame was not accepted.
    fn queue_input(
        &mut self,
        data: &[u8],
        pts_us: u64,
        timeout: Duration,
    ) -> Result<bool, EncoderError>;

    /// Next ready output, if any, without waiting
    fn dequeue_output(&mut self) -> Result<Option<EncodedAccessUnit>, EncoderError>;
}

/// Looks up an encoder for a format
pub trait EncoderFactory: Send + Sync {
    /// `None` when nothing on this device can encode `format`
    fn create(&self, format: &EncoderFormat) -> Option<Box<dyn EncoderBackend>>;
}
