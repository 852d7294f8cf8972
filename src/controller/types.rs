use crate::transport::TransportMode;
use std::fmt;

/// Controller lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Streaming,
}

/// Which of the mutually exclusive video paths a stream uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoRoute {
    /// Uncompressed frames over the video stream socket
    RawTcp,
    /// Encoded access units over the video stream socket
    EncodedTcp,
    /// Encoded access units as datagrams to the video port
    EncodedUdp,
}

impl VideoRoute {
    /// Datagrams always carry encoded video; over TCP raw frames are sent
    /// unless encoding is forced.
    pub fn resolve(force_encode: bool, mode: TransportMode) -> Self {
        match (mode, force_encode) {
            (TransportMode::Udp, _) => VideoRoute::EncodedUdp,
            (TransportMode::Tcp, true) => VideoRoute::EncodedTcp,
            (TransportMode::Tcp, false) => VideoRoute::RawTcp,
        }
    }

    pub fn is_encoded(&self) -> bool {
        !matches!(self, VideoRoute::RawTcp)
    }
}

impl fmt::Display for VideoRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoRoute::RawTcp => write!(f, "raw over tcp"),
            VideoRoute::EncodedTcp => write!(f, "encoded over tcp"),
            VideoRoute::EncodedUdp => write!(f, "encoded over udp"),
        }
    }
}

/// Why a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// A signal or the caller asked to stop
    Cancelled,
    EncoderFailed(String),
}
