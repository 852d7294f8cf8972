use super::types::VideoRoute;
use crate::camera::{FrameSink, ProcessingGuard};
use crate::encoder::VideoEncoder;
use crate::error::EncoderError;
use crate::events::{EventBus, StreamEvent};
use crate::frame::RawFrame;
use crate::protocol::{encode_video_frame, pack_encoder_input, pack_frame};
use crate::transport::TransportSession;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{error, trace, warn};

enum Stage {
    /// Pack and send each frame as is
    Raw,
    /// Feed each frame to a pull-mode encoder on a blocking thread
    Pull(Arc<Mutex<VideoEncoder>>),
    /// The encoder pulls from the frame slot itself
    Push,
}

/// Routes frames accepted by the capture adapter to the transport
pub struct FramePipeline {
    route: VideoRoute,
    stage: Stage,
    transport: Arc<TransportSession>,
    events: EventBus,
    runtime: Handle,
    frames_sent: Arc<AtomicU64>,
}

impl FramePipeline {
    pub fn raw(transport: Arc<TransportSession>, events: EventBus, runtime: Handle) -> Self {
        Self::with_stage(VideoRoute::RawTcp, Stage::Raw, transport, events, runtime)
    }

    pub fn pull(
        route: VideoRoute,
        encoder: Arc<Mutex<VideoEncoder>>,
        transport: Arc<TransportSession>,
        events: EventBus,
        runtime: Handle,
    ) -> Self {
        Self::with_stage(route, Stage::Pull(encoder), transport, events, runtime)
    }

    pub fn push(
        route: VideoRoute,
        transport: Arc<TransportSession>,
        events: EventBus,
        runtime: Handle,
    ) -> Self {
        Self::with_stage(route, Stage::Push, transport, events, runtime)
    }

    fn with_stage(
        route: VideoRoute,
        stage: Stage,
        transport: Arc<TransportSession>,
        events: EventBus,
        runtime: Handle,
    ) -> Self {
        Self {
            route,
            stage,
            transport,
            events,
            runtime,
            frames_sent: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn route(&self) -> VideoRoute {
        self.route
    }

    /// Frames (raw) or encoder runs (pull) that put data on the video queue
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    fn send_raw(&self, frame: &RawFrame) {
        let framed = pack_frame(frame).and_then(|(header, payload)| encode_video_frame(&header, &payload));
        match framed {
            Ok(bytes) => {
                if self.transport.send_video(bytes) {
                    self.frames_sent.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(e) => warn!("Cannot frame raw frame {}: {}", frame.sequence, e),
        }
    }
}

impl FrameSink for FramePipeline {
    fn process(&self, frame: Arc<RawFrame>, guard: ProcessingGuard) {
        match &self.stage {
            Stage::Raw => {
                self.send_raw(&frame);
                drop(guard);
            }
            Stage::Push => {
                trace!("Frame {} left in slot for the encoder", frame.sequence);
                drop(guard);
            }
            Stage::Pull(encoder) => {
                let encoder = Arc::clone(encoder);
                let transport = Arc::clone(&self.transport);
                let events = self.events.clone();
                let frames_sent = Arc::clone(&self.frames_sent);

                // The guard travels with the work so capture stays "busy"
                // until this frame is encoded
                self.runtime.spawn_blocking(move || {
                    let _guard = guard;
                    encode_and_send(&frame, &encoder, &transport, &events, &frames_sent);
                });
            }
        }
    }
}

fn encode_and_send(
    frame: &RawFrame,
    encoder: &Mutex<VideoEncoder>,
    transport: &TransportSession,
    events: &EventBus,
    frames_sent: &AtomicU64,
) {
    let input = pack_encoder_input(frame);
    let mut encoder = encoder.lock();

    let expected = encoder.format().map(|format| format.input_frame_len());
    if let Some(expected) = expected.filter(|&len| len != input.len()) {
        warn!(
            "Frame {} gives {} input bytes, encoder expects {}; skipping",
            frame.sequence,
            input.len(),
            expected
        );
        return;
    }

    match encoder.encode_units(&input) {
        Ok(units) => {
            let mut sent = false;
            for unit in &units {
                if !unit.is_config() && !transport.config_sent() {
                    if let Some(config) = encoder.config_unit() {
                        transport.ensure_config(config, unit.pts_us, frame.width, frame.height);
                    }
                }
                sent |= transport.send_access_unit(unit, frame.width, frame.height);
            }
            if sent {
                frames_sent.fetch_add(1, Ordering::Relaxed);
            }
        }
        Err(EncoderError::InvalidState { actual, .. }) => {
            trace!("Encoder {}, frame {} not encoded", actual, frame.sequence);
        }
        Err(e @ EncoderError::MissingConfiguration { .. }) => {
            // Without a configuration unit the receiver can never decode
            // this run, so it ends here
            error!("Encoder output unusable: {}", e);
            let _ = encoder.stop();
            events.publish(StreamEvent::EncoderFailed {
                reason: e.to_string(),
            });
        }
        Err(e) if e.is_fatal() => {
            let _ = encoder.stop();
            events.publish(StreamEvent::EncoderFailed {
                reason: e.to_string(),
            });
        }
        Err(e) => warn!("Encoding frame {} failed: {}", frame.sequence, e),
    }
}
