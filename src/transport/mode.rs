use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

/// Requested transport, as configured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportPreference {
    /// UDP for remote receivers
    #[default]
    Auto,
    Udp,
    Tcp,
}

/// Transport actually used by a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    Udp,
    Tcp,
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportMode::Udp => write!(f, "udp"),
            TransportMode::Tcp => write!(f, "tcp"),
        }
    }
}

/// Loopback destinations always get TCP; anything else follows the
/// preference, with `Auto` meaning UDP.
pub fn select_mode(addr: &SocketAddr, preference: TransportPreference) -> TransportMode {
    if addr.ip().is_loopback() {
        return TransportMode::Tcp;
    }

    match preference {
        TransportPreference::Auto | TransportPreference::Udp => TransportMode::Udp,
        TransportPreference::Tcp => TransportMode::Tcp,
    }
}
