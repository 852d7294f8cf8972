use super::pipeline::FramePipeline;
use super::types::{StreamState, VideoRoute};
use crate::camera::{CaptureAdapter, CaptureSource, CaptureStats, Delivery, FrameSink};
use crate::config::{EncoderMode, XrLinkConfig};
use crate::encoder::{EncoderFactory, EncoderSession, VideoEncoder};
use crate::error::Result;
use crate::events::{EventBus, StreamEvent};
use crate::frame::RawFrame;
use crate::frame_slot::FrameSlot;
use crate::pose::{PoseAssembler, PoseSource, SensorReading, SensorSource};
use crate::transport::{TransportSession, TransportStatsSnapshot};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Everything that belongs to one start/stop cycle
struct ActiveStream {
    transport: Arc<TransportSession>,
    route: VideoRoute,
    encoder: Option<Arc<parking_lot::Mutex<VideoEncoder>>>,
    /// Push-mode callback handler, when the encoder runs asynchronously
    encoder_session: Option<Arc<EncoderSession>>,
}

impl ActiveStream {
    /// Let a push-mode encoder end its stream once the slot runs empty
    fn begin_stop(&self) {
        if let Some(session) = &self.encoder_session {
            session.begin_stop();
        }
    }

    /// Stop the encoder, then close both sockets. Sends still queued are
    /// abandoned.
    async fn shutdown(mut self) {
        self.begin_stop();
        if let Some(encoder) = self.encoder.take() {
            let stopped = tokio::task::spawn_blocking(move || encoder.lock().stop()).await;
            match stopped {
                Ok(Ok(())) => debug!("Encoder stopped"),
                Ok(Err(e)) => warn!("Encoder stop reported an error: {}", e),
                Err(e) => error!("Encoder stop task failed: {}", e),
            }
        }
        self.transport.disconnect();
    }
}

/// Owns the capture, sensor, encoder and transport components and runs
/// them as one stream to a headset
pub struct StreamController {
    config: XrLinkConfig,
    capture: Arc<dyn CaptureSource>,
    sensors: Arc<dyn SensorSource>,
    pose_source: Arc<dyn PoseSource>,
    encoder_factory: Arc<dyn EncoderFactory>,
    event_bus: EventBus,
    slot: Arc<FrameSlot>,
    adapter: Arc<CaptureAdapter>,
    active: Mutex<Option<ActiveStream>>,
    state: parking_lot::Mutex<StreamState>,
    last_failure: parking_lot::Mutex<Option<String>>,
}

impl StreamController {
    pub fn new(
        config: XrLinkConfig,
        capture: Arc<dyn CaptureSource>,
        sensors: Arc<dyn SensorSource>,
        pose_source: Arc<dyn PoseSource>,
        encoder_factory: Arc<dyn EncoderFactory>,
        event_bus: EventBus,
    ) -> Self {
        let slot = Arc::new(FrameSlot::new());
        let adapter = Arc::new(CaptureAdapter::new(Arc::clone(&slot)));

        Self {
            config,
            capture,
            sensors,
            pose_source,
            encoder_factory,
            event_bus,
            slot,
            adapter,
            active: Mutex::new(None),
            state: parking_lot::Mutex::new(StreamState::Idle),
            last_failure: parking_lot::Mutex::new(None),
        }
    }

    pub fn config(&self) -> &XrLinkConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn stream_state(&self) -> StreamState {
        *self.state.lock()
    }

    /// Reason the most recent start or run failed, if any
    pub fn last_failure(&self) -> Option<String> {
        self.last_failure.lock().clone()
    }

    pub fn record_failure(&self, reason: impl Into<String>) {
        *self.last_failure.lock() = Some(reason.into());
    }

    pub fn frame_slot(&self) -> &Arc<FrameSlot> {
        &self.slot
    }

    pub fn capture_stats(&self) -> CaptureStats {
        self.adapter.stats()
    }

    /// Video path of the running stream
    pub async fn active_route(&self) -> Option<VideoRoute> {
        self.active.lock().await.as_ref().map(|stream| stream.route)
    }

    pub async fn transport_stats(&self) -> Option<TransportStatsSnapshot> {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|stream| stream.transport.stats())
    }

    /// Connect to the headset and start capture, encoding and sensors.
    ///
    /// Starting while already streaming is a no-op. On failure everything
    /// opened so far is torn down again and the reason is kept in
    /// [`last_failure`](Self::last_failure).
    pub async fn start_stream(&self) -> Result<()> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            warn!("Stream already running, ignoring start request");
            return Ok(());
        }

        let stream_config = &self.config.stream;
        info!(
            "Starting stream to {} (video port {}, sensor port {})",
            stream_config.host, stream_config.video_port, stream_config.sensor_port
        );

        let transport = match TransportSession::connect(stream_config).await {
            Ok(transport) => Arc::new(transport),
            Err(e) => {
                error!("Failed to connect to {}: {}", stream_config.host, e);
                self.record_failure(e.to_string());
                return Err(e);
            }
        };

        let route = VideoRoute::resolve(self.config.encoder.force_encode, transport.mode());
        let mut stream = ActiveStream {
            transport,
            route,
            encoder: None,
            encoder_session: None,
        };

        if let Err(e) = self.open_components(&mut stream).await {
            error!("Failed to start stream: {}", e);
            self.record_failure(e.to_string());
            stream.begin_stop();
            self.close_components().await;
            stream.shutdown().await;
            return Err(e);
        }

        let session_id = stream.transport.id().to_string();
        info!("Stream {} running, video {}", session_id, route);
        *active = Some(stream);
        *self.state.lock() = StreamState::Streaming;
        *self.last_failure.lock() = None;

        self.event_bus.publish(StreamEvent::StreamStarted {
            session_id,
            timestamp: SystemTime::now(),
        });
        Ok(())
    }

    async fn open_components(&self, stream: &mut ActiveStream) -> Result<()> {
        let runtime = Handle::current();
        let (width, height) = self.capture.resolution();
        let encoder_config = &self.config.encoder;

        let pipeline = if stream.route.is_encoded() {
            let mut encoder =
                VideoEncoder::new(Arc::clone(&self.encoder_factory), encoder_config.clone());

            match encoder_config.mode {
                EncoderMode::Sync => {
                    encoder.start(width, height, encoder_config.bitrate)?;
                    let encoder = Arc::new(parking_lot::Mutex::new(encoder));
                    stream.encoder = Some(Arc::clone(&encoder));
                    FramePipeline::pull(
                        stream.route,
                        encoder,
                        Arc::clone(&stream.transport),
                        self.event_bus.clone(),
                        runtime,
                    )
                }
                EncoderMode::Async => {
                    let session = Arc::new(EncoderSession::new(
                        Arc::clone(&self.slot),
                        Arc::clone(&stream.transport),
                        encoder.state_handle(),
                        self.event_bus.clone(),
                        (width, height),
                    ));
                    stream.encoder_session = Some(Arc::clone(&session));
                    encoder.start_async(width, height, encoder_config.bitrate, session)?;
                    stream.encoder = Some(Arc::new(parking_lot::Mutex::new(encoder)));
                    FramePipeline::push(
                        stream.route,
                        Arc::clone(&stream.transport),
                        self.event_bus.clone(),
                        runtime,
                    )
                }
            }
        } else {
            FramePipeline::raw(
                Arc::clone(&stream.transport),
                self.event_bus.clone(),
                runtime,
            )
        };

        let assembler = Arc::new(PoseAssembler::new(Arc::clone(&self.pose_source)));
        let transport = Arc::clone(&stream.transport);
        self.sensors
            .start(Arc::new(move |reading: SensorReading| {
                if let Some(sample) = assembler.on_reading(reading) {
                    transport.send_sample(&sample);
                }
            }))
            .await?;

        let sink: Arc<dyn FrameSink> = Arc::new(pipeline);
        self.adapter.set_sink(Some(sink));

        let adapter = Arc::clone(&self.adapter);
        let event_bus = self.event_bus.clone();
        self.capture
            .start(Arc::new(move |frame: RawFrame| {
                if let Delivery::Accepted { dropped_before } = adapter.deliver(frame) {
                    if dropped_before > 0 {
                        event_bus.publish(StreamEvent::FramesDropped {
                            count: dropped_before,
                        });
                    }
                }
            }))
            .await?;

        Ok(())
    }

    /// Stop capture and sensors and detach the frame pipeline. Safe to call
    /// on components that never started.
    async fn close_components(&self) {
        if let Err(e) = self.capture.stop().await {
            warn!("Failed to stop capture: {}", e);
        }
        self.adapter.set_sink(None);

        if let Err(e) = self.sensors.stop().await {
            warn!("Failed to stop sensors: {}", e);
        }

        // Once stopping, an empty slot makes a push-mode encoder drain with
        // end-of-stream
        self.slot.clear();
    }

    /// Stop everything and close both sockets.
    ///
    /// Runs the full teardown even when no stream is active, so no socket
    /// survives a stop regardless of how far a start got.
    pub async fn stop_stream(&self) -> Result<()> {
        let mut active = self.active.lock().await;
        info!("Stopping stream");

        if let Some(stream) = active.as_ref() {
            stream.begin_stop();
        }
        self.close_components().await;

        let session_id = match active.take() {
            Some(stream) => {
                let id = stream.transport.id().to_string();
                let stats = stream.transport.stats();
                stream.shutdown().await;
                info!(
                    "Stream {} closed: {} video and {} sensor messages sent, {} dropped",
                    id,
                    stats.video.sent,
                    stats.sensor.sent,
                    stats.video.dropped + stats.sensor.dropped
                );
                Some(id)
            }
            None => {
                debug!("No active stream");
                None
            }
        };

        *self.state.lock() = StreamState::Idle;
        self.event_bus.publish(StreamEvent::StreamStopped {
            session_id,
            timestamp: SystemTime::now(),
        });
        Ok(())
    }

    /// Record a fatal encoder failure reported while streaming
    pub fn on_encoder_failed(&self, reason: &str) {
        error!("Encoder failed while streaming: {}", reason);
        self.record_failure(format!("encoder failed: {}", reason));
    }
}
