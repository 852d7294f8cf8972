use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for one socket
#[derive(Debug, Default)]
pub(crate) struct ChannelCounters {
    sent: AtomicU64,
    dropped: AtomicU64,
    bytes: AtomicU64,
}

impl ChannelCounters {
    pub(crate) fn record_sent(&self, len: usize) {
        self.sent.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(len as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ChannelStatsSnapshot {
        ChannelStatsSnapshot {
            sent: self.sent.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

/// Session-wide transport counters
#[derive(Debug, Default)]
pub struct TransportStats {
    pub(crate) video: Arc<ChannelCounters>,
    pub(crate) sensor: Arc<ChannelCounters>,
    gated: AtomicU64,
}

impl TransportStats {
    pub(crate) fn record_gated(&self) {
        self.gated.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current statistics as a snapshot
    pub fn snapshot(&self) -> TransportStatsSnapshot {
        TransportStatsSnapshot {
            video: self.video.snapshot(),
            sensor: self.sensor.snapshot(),
            gated: self.gated.load(Ordering::Relaxed),
        }
    }
}

/// Per-socket counters. `sent` counts writes that reached the socket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStatsSnapshot {
    pub sent: u64,
    pub dropped: u64,
    pub bytes: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStatsSnapshot {
    pub video: ChannelStatsSnapshot,
    pub sensor: ChannelStatsSnapshot,
    /// Access units held back because no configuration unit had been sent
    pub gated: u64,
}
