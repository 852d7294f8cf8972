use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum XrLinkError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Encoder error: {0}")]
    Encoder(#[from] EncoderError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl XrLinkError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Capture source failures
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Camera {index} unavailable: {details}")]
    Unavailable { index: u32, details: String },

    #[error("Camera access denied: {details}")]
    PermissionDenied { details: String },

    #[error("Camera is already delivering frames")]
    AlreadyStarted,

    #[error("Camera configuration failed: {details}")]
    Configuration { details: String },
}

/// Video encoder failures
#[derive(Error, Debug, Clone)]
pub enum EncoderError {
    #[error("No encoder available for {mime} at {width}x{height}")]
    HardwareUnavailable {
        mime: String,
        width: u32,
        height: u32,
    },

    #[error("Encoder configuration failed: {details}")]
    Configuration { details: String },

    #[error("Encoder is {actual}, expected {expected}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("First encoder output is not a configuration unit (leading bytes {leading:02x?})")]
    MissingConfiguration { leading: Vec<u8> },

    #[error("Codec error: {details}")]
    Codec { details: String, fatal: bool },

    #[error("Encoder backend does not support {operation}")]
    Unsupported { operation: &'static str },
}

impl EncoderError {
    /// Whether the codec can no longer produce output
    pub fn is_fatal(&self) -> bool {
        match self {
            EncoderError::Codec { fatal, .. } => *fatal,
            EncoderError::HardwareUnavailable { .. } => true,
            _ => false,
        }
    }
}

/// Network session failures
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No address found for {host}")]
    NoAddress { host: String },

    #[error("Connect to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: SocketAddr, timeout: Duration },

    #[error("Connect to {addr} failed: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to bind datagram socket: {0}")]
    Bind(#[source] std::io::Error),
}

/// Wire format violations seen while decoding
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Truncated packet: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("Unknown frame format tag {tag:#06x}")]
    UnknownFormat { tag: u16 },

    #[error("Payload of {len} bytes does not fit the 32-bit length field")]
    PayloadTooLarge { len: usize },

    #[error("Dimension {value} does not fit the 16-bit header field {field}")]
    DimensionOverflow { field: &'static str, value: u32 },
}

pub type Result<T> = std::result::Result<T, XrLinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        let transient = EncoderError::Codec {
            details: "input dropped".to_string(),
            fatal: false,
        };
        let crashed = EncoderError::Codec {
            details: "media server died".to_string(),
            fatal: true,
        };

        assert!(!transient.is_fatal());
        assert!(crashed.is_fatal());
        assert!(!EncoderError::Unsupported { operation: "push mode" }.is_fatal());
    }

    #[test]
    fn test_component_error_message() {
        let err = XrLinkError::component("transport", "socket closed");
        assert_eq!(err.to_string(), "Component error in transport: socket closed");
    }

    #[test]
    fn test_nested_conversion() {
        let err: XrLinkError = ProtocolError::UnknownFormat { tag: 0xbeef }.into();
        assert!(matches!(
            err,
            XrLinkError::Protocol(ProtocolError::UnknownFormat { tag: 0xbeef })
        ));
    }
}
