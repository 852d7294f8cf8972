use crate::frame::RawFrame;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Single-slot, latest-wins mailbox between the capture callback and the
/// encoder/transport stage.
///
/// The lock only guards the `Option<Arc<RawFrame>>` swap, so readers see
/// either nothing or one complete frame. Frames are shared, never copied or
/// mutated, and the lock is never held across encoding or I/O.
pub struct FrameSlot {
    current: Mutex<Option<Arc<RawFrame>>>,
    stats: FrameSlotStats,
}

/// Counters for slot activity
#[derive(Debug)]
pub struct FrameSlotStats {
    /// Frames written into the slot
    pub published: AtomicU64,
    /// Frames overwritten before anyone looked at them
    pub replaced: AtomicU64,
    /// Snapshot reads that returned a frame
    pub snapshots: AtomicU64,
}

impl FrameSlotStats {
    fn new() -> Self {
        Self {
            published: AtomicU64::new(0),
            replaced: AtomicU64::new(0),
            snapshots: AtomicU64::new(0),
        }
    }

    /// Get current statistics as a snapshot
    pub fn snapshot(&self) -> FrameSlotStatsSnapshot {
        FrameSlotStatsSnapshot {
            published: self.published.load(Ordering::Relaxed),
            replaced: self.replaced.load(Ordering::Relaxed),
            snapshots: self.snapshots.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of frame slot statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSlotStatsSnapshot {
    pub published: u64,
    pub replaced: u64,
    pub snapshots: u64,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
            stats: FrameSlotStats::new(),
        }
    }

    /// Replace whatever frame is held. Never blocks on I/O and never fails;
    /// an unconsumed previous frame is simply dropped.
    pub fn publish(&self, frame: impl Into<Arc<RawFrame>>) {
        let frame = frame.into();
        let sequence = frame.sequence;

        let previous = {
            let mut slot = self.current.lock();
            slot.replace(frame)
        };

        self.stats.published.fetch_add(1, Ordering::Relaxed);
        if let Some(previous) = previous {
            self.stats.replaced.fetch_add(1, Ordering::Relaxed);
            trace!(
                "Frame {} replaced by frame {} in slot",
                previous.sequence,
                sequence
            );
        } else {
            trace!("Frame {} published to empty slot", sequence);
        }
    }

    /// Return the currently held frame without removing it
    pub fn take_snapshot(&self) -> Option<Arc<RawFrame>> {
        let frame = self.current.lock().clone();
        if frame.is_some() {
            self.stats.snapshots.fetch_add(1, Ordering::Relaxed);
        }
        frame
    }

    /// Run `f` with the slot locked. Used by the encoder input callback, which
    /// must decide between a frame and end-of-stream atomically. `f` must not
    /// re-enter the slot.
    pub fn with_locked<R>(&self, f: impl FnOnce(Option<&Arc<RawFrame>>) -> R) -> R {
        let slot = self.current.lock();
        if slot.is_some() {
            self.stats.snapshots.fetch_add(1, Ordering::Relaxed);
        }
        f(slot.as_ref())
    }

    /// Drop the held frame so pulling consumers see "no frame"
    pub fn clear(&self) {
        if self.current.lock().take().is_some() {
            debug!("Frame slot cleared");
        }
    }

    pub fn is_empty(&self) -> bool {
        self.current.lock().is_none()
    }

    /// Get current slot statistics
    pub fn stats(&self) -> FrameSlotStatsSnapshot {
        self.stats.snapshot()
    }
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn frame(sequence: u64) -> RawFrame {
        RawFrame::packed(sequence, 640, 480, vec![sequence as u8; 640 * 480 * 3 / 2])
    }

    #[test]
    fn test_empty_slot() {
        let slot = FrameSlot::new();
        assert!(slot.is_empty());
        assert!(slot.take_snapshot().is_none());
    }

    #[test]
    fn test_latest_frame_wins() {
        let slot = FrameSlot::new();
        slot.publish(frame(1));
        slot.publish(frame(2));

        let snapshot = slot.take_snapshot().unwrap();
        assert_eq!(snapshot.sequence, 2);
        assert_eq!(snapshot.width, 640);
        assert_eq!(snapshot.row_stride(), 640);

        let stats = slot.stats();
        assert_eq!(stats.published, 2);
        assert_eq!(stats.replaced, 1);
    }

    #[test]
    fn test_snapshot_does_not_consume() {
        let slot = FrameSlot::new();
        slot.publish(frame(5));

        assert_eq!(slot.take_snapshot().unwrap().sequence, 5);
        assert_eq!(slot.take_snapshot().unwrap().sequence, 5);
        assert_eq!(slot.stats().snapshots, 2);
    }

    #[test]
    fn test_many_publishes_only_last_observable() {
        let slot = FrameSlot::new();
        for sequence in 0..50 {
            slot.publish(frame(sequence));
        }
        assert_eq!(slot.take_snapshot().unwrap().sequence, 49);
        assert_eq!(slot.stats().replaced, 49);
    }

    #[test]
    fn test_clear() {
        let slot = FrameSlot::new();
        slot.publish(frame(1));
        slot.clear();
        assert!(slot.is_empty());
        assert!(slot.with_locked(|held| held.is_none()));
    }

    #[test]
    fn test_concurrent_publish_and_snapshot() {
        let slot = Arc::new(FrameSlot::new());

        let writer = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || {
                for sequence in 0..200u64 {
                    slot.publish(frame(sequence));
                }
            })
        };

        let reader = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || {
                for _ in 0..200 {
                    if let Some(held) = slot.take_snapshot() {
                        // Every observed frame is complete and self-consistent
                        assert_eq!(held.byte_len(), 640 * 480 * 3 / 2);
                        if let crate::frame::FrameBuffer::Packed(data) = &held.buffer {
                            assert!(data.iter().all(|&b| b == held.sequence as u8));
                        }
                    }
                }
            })
        };

        writer.join().unwrap();
        reader.join().unwrap();
        assert_eq!(slot.take_snapshot().unwrap().sequence, 199);
    }
}
