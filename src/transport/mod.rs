//! Network side of a stream: one video and one sensor socket, each drained
//! by its own writer task so producers never wait on the network.

mod mode;
mod session;
mod stats;
mod writer;
#[cfg(test)]
mod tests;

pub use mode::{select_mode, TransportMode, TransportPreference};
pub use session::TransportSession;
pub use stats::{ChannelStatsSnapshot, TransportStats, TransportStatsSnapshot};
