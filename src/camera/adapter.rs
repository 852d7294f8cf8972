use crate::frame::RawFrame;
use crate::frame_slot::FrameSlot;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Downstream consumer of accepted frames.
///
/// The capture adapter stays "busy" until the guard is dropped, so a sink
/// that finishes its work on another task moves the guard there.
pub trait FrameSink: Send + Sync {
    fn process(&self, frame: Arc<RawFrame>, guard: ProcessingGuard);
}

/// Clears the adapter's processing flag when dropped
pub struct ProcessingGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Result of one frame delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Frame accepted; `dropped_before` frames were discarded since the last
    /// accepted one
    Accepted { dropped_before: u64 },
    /// Previous frame still in flight, this one was discarded
    Dropped,
}

/// Counters for capture deliveries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureStats {
    pub accepted: u64,
    pub dropped_total: u64,
}

/// Bridges the camera callback to the frame slot with a drop-if-busy policy.
///
/// At most one frame is in flight; anything arriving meanwhile is counted and
/// discarded without touching the slot.
pub struct CaptureAdapter {
    slot: Arc<FrameSlot>,
    processing: Arc<AtomicBool>,
    pending_drops: AtomicU64,
    accepted: AtomicU64,
    dropped_total: AtomicU64,
    sink: RwLock<Option<Arc<dyn FrameSink>>>,
}

impl CaptureAdapter {
    pub fn new(slot: Arc<FrameSlot>) -> Self {
        Self {
            slot,
            processing: Arc::new(AtomicBool::new(false)),
            pending_drops: AtomicU64::new(0),
            accepted: AtomicU64::new(0),
            dropped_total: AtomicU64::new(0),
            sink: RwLock::new(None),
        }
    }

    /// Attach or detach the consumer of accepted frames
    pub fn set_sink(&self, sink: Option<Arc<dyn FrameSink>>) {
        *self.sink.write() = sink;
    }

    /// Hand one hardware frame to the pipeline
    pub fn deliver(&self, frame: RawFrame) -> Delivery {
        if self
            .processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.pending_drops.fetch_add(1, Ordering::Relaxed);
            self.dropped_total.fetch_add(1, Ordering::Relaxed);
            trace!("Frame {} dropped, previous frame still processing", frame.sequence);
            return Delivery::Dropped;
        }

        let guard = ProcessingGuard {
            flag: Arc::clone(&self.processing),
        };

        let dropped_before = self.pending_drops.swap(0, Ordering::Relaxed);
        if dropped_before > 0 {
            debug!(
                "Skipped {} frames before accepting frame {}",
                dropped_before, frame.sequence
            );
        }
        self.accepted.fetch_add(1, Ordering::Relaxed);

        let frame = Arc::new(frame);
        self.slot.publish(Arc::clone(&frame));

        let sink = self.sink.read().clone();
        if let Some(sink) = sink {
            sink.process(frame, guard);
        }

        Delivery::Accepted { dropped_before }
    }

    /// Whether a frame is currently in flight
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// Frames dropped since the last accepted one
    pub fn pending_drops(&self) -> u64 {
        self.pending_drops.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            dropped_total: self.dropped_total.load(Ordering::Relaxed),
        }
    }

    pub fn slot(&self) -> &Arc<FrameSlot> {
        &self.slot
    }
}
