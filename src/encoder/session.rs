use super::adapter::{EncoderState, EncoderStateCell};
use super::backend::{AccessUnitKind, EncodedAccessUnit, EncoderCallback, EncoderInput, OutputFormat};
use crate::error::EncoderError;
use crate::events::{EventBus, StreamEvent};
use crate::frame_slot::FrameSlot;
use crate::protocol::pack_encoder_input;
use crate::transport::TransportSession;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// Push-mode glue between the codec callbacks, the frame slot and the
/// transport.
///
/// Outputs are forwarded only after a format change has delivered both
/// parameter sets during this run, and only while the video socket is up.
/// An empty slot ends the stream only once `begin_stop` was called; before
/// that the codec is told to ask again.
pub struct EncoderSession {
    slot: Arc<FrameSlot>,
    transport: Arc<TransportSession>,
    state: Arc<EncoderStateCell>,
    events: EventBus,
    frame_size: (u32, u32),
    started_at: Instant,
    stopping: AtomicBool,
    ended: AtomicBool,
    config_detected: AtomicBool,
    config: Mutex<Option<Bytes>>,
    forwarded: AtomicU64,
    dropped: AtomicU64,
}

impl EncoderSession {
    pub fn new(
        slot: Arc<FrameSlot>,
        transport: Arc<TransportSession>,
        state: Arc<EncoderStateCell>,
        events: EventBus,
        frame_size: (u32, u32),
    ) -> Self {
        Self {
            slot,
            transport,
            state,
            events,
            frame_size,
            started_at: Instant::now(),
            stopping: AtomicBool::new(false),
            ended: AtomicBool::new(false),
            config_detected: AtomicBool::new(false),
            config: Mutex::new(None),
            forwarded: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn config_detected(&self) -> bool {
        self.config_detected.load(Ordering::Acquire)
    }

    /// Mark the run as stopping, so the next input request that finds the
    /// slot empty submits end-of-stream
    pub fn begin_stop(&self) {
        if !self.stopping.swap(true, Ordering::AcqRel) {
            debug!("Encoder session stopping");
        }
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    /// Whether an input request has signalled end-of-stream
    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    /// Units handed to the transport
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    /// Units discarded before reaching the transport
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn pts_us(&self) -> u64 {
        self.started_at.elapsed().as_micros() as u64
    }

    fn send(&self, unit: &EncodedAccessUnit) -> bool {
        let (width, height) = self.frame_size;
        if !self.transport.is_video_connected() {
            trace!("Video socket down, dropping access unit at {}us", unit.pts_us);
            return false;
        }

        // A configuration unit lost to a full queue goes out again ahead of
        // the next picture
        if !unit.is_config() && !self.transport.config_sent() {
            let config = self.config.lock().clone();
            if let Some(config) = config {
                if self.transport.ensure_config(&config, unit.pts_us, width, height) {
                    self.forwarded.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        self.transport.send_access_unit(unit, width, height)
    }
}

impl EncoderCallback for EncoderSession {
    fn on_input_ready(&self) -> EncoderInput {
        // Decide between a frame and end-of-stream while the slot is locked,
        // so a concurrent clear cannot slip between the check and the flag
        let frame = self.slot.with_locked(|held| {
            let frame = held.cloned();
            if frame.is_none() && self.is_stopping() {
                self.ended.store(true, Ordering::Release);
            }
            frame
        });

        let Some(frame) = frame else {
            if self.is_ended() {
                debug!("Stopping with no frame held, submitting end of stream");
                return EncoderInput::EndOfStream;
            }
            trace!("No frame captured yet, input not ready");
            return EncoderInput::NotReady;
        };

        if (frame.width, frame.height) != self.frame_size {
            warn!(
                "Frame {} is {}x{}, encoder expects {}x{}; skipping",
                frame.sequence, frame.width, frame.height, self.frame_size.0, self.frame_size.1
            );
            return EncoderInput::NotReady;
        }

        EncoderInput::Frame {
            data: pack_encoder_input(&frame),
            pts_us: self.pts_us(),
        }
    }

    fn on_output_ready(&self, unit: EncodedAccessUnit) {
        if unit.kind == AccessUnitKind::EndOfStream {
            debug!("Encoder drained at {}us", unit.pts_us);
            return;
        }

        if self.state.get() == EncoderState::Stopped {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            trace!("Encoder stopped, discarding access unit");
            return;
        }

        if !self.config_detected() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(
                "Dropping access unit at {}us: encoder configuration not seen yet",
                unit.pts_us
            );
            return;
        }

        if self.send(&unit) {
            self.forwarded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn on_format_changed(&self, format: OutputFormat) {
        if self.state.get() == EncoderState::Stopped {
            debug!("Encoder stopped, ignoring output format change");
            return;
        }

        let Some(config) = format.configuration_unit() else {
            warn!(
                "Encoder output format lacks parameter sets (csd-0 {}, csd-1 {}), ignoring",
                if format.csd0.is_some() { "present" } else { "missing" },
                if format.csd1.is_some() { "present" } else { "missing" }
            );
            return;
        };

        if !self.config_detected.swap(true, Ordering::AcqRel) {
            info!("Encoder configuration detected ({} bytes)", config.len());
        }
        *self.config.lock() = Some(config.clone());

        let unit = EncodedAccessUnit::config(config, self.pts_us());
        if self.send(&unit) {
            self.forwarded.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn on_error(&self, error: EncoderError) {
        if !error.is_fatal() {
            warn!("Encoder error, continuing: {}", error);
            return;
        }

        if self.state.set(EncoderState::Stopped) != EncoderState::Stopped {
            error!("Encoder crashed: {}", error);
            self.events.publish(StreamEvent::EncoderFailed {
                reason: error.to_string(),
            });
        }
    }
}
