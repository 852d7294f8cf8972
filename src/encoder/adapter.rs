use super::backend::{
    AccessUnitKind, EncodedAccessUnit, EncoderBackend, EncoderCallback, EncoderFactory,
    EncoderFormat,
};
use crate::config::EncoderConfig;
use crate::error::EncoderError;
use bytes::Bytes;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// Lifecycle of a [`VideoEncoder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderState {
    Unconfigured,
    Configured,
    Running,
    Stopped,
}

impl EncoderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncoderState::Unconfigured => "unconfigured",
            EncoderState::Configured => "configured",
            EncoderState::Running => "running",
            EncoderState::Stopped => "stopped",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => EncoderState::Unconfigured,
            1 => EncoderState::Configured,
            2 => EncoderState::Running,
            _ => EncoderState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            EncoderState::Unconfigured => 0,
            EncoderState::Configured => 1,
            EncoderState::Running => 2,
            EncoderState::Stopped => 3,
        }
    }
}

impl fmt::Display for EncoderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoder state readable and writable from codec callback threads
#[derive(Debug)]
pub struct EncoderStateCell(AtomicU8);

impl EncoderStateCell {
    pub fn new(state: EncoderState) -> Self {
        Self(AtomicU8::new(state.as_u8()))
    }

    pub fn get(&self) -> EncoderState {
        EncoderState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Store `next`, returning the previous state
    pub fn set(&self, next: EncoderState) -> EncoderState {
        EncoderState::from_u8(self.0.swap(next.as_u8(), Ordering::AcqRel))
    }
}

/// Drives one encoder backend through configure, start and stop.
///
/// In pull mode the caller feeds frames with [`VideoEncoder::encode`]. In
/// push mode the backend calls an [`EncoderCallback`] installed at start.
/// A stopped encoder is never restarted; build a new one instead.
pub struct VideoEncoder {
    factory: Arc<dyn EncoderFactory>,
    config: EncoderConfig,
    backend: Option<Box<dyn EncoderBackend>>,
    state: Arc<EncoderStateCell>,
    format: Option<EncoderFormat>,
    started_at: Option<Instant>,
    first_output_seen: bool,
    config_unit: Option<Bytes>,
    frames_queued: u64,
    units_emitted: u64,
}

impl VideoEncoder {
    pub fn new(factory: Arc<dyn EncoderFactory>, config: EncoderConfig) -> Self {
        Self {
            factory,
            config,
            backend: None,
            state: Arc::new(EncoderStateCell::new(EncoderState::Unconfigured)),
            format: None,
            started_at: None,
            first_output_seen: false,
            config_unit: None,
            frames_queued: 0,
            units_emitted: 0,
        }
    }

    pub fn state(&self) -> EncoderState {
        self.state.get()
    }

    /// Shared state, for callbacks that must mark the encoder failed
    pub fn state_handle(&self) -> Arc<EncoderStateCell> {
        Arc::clone(&self.state)
    }

    pub fn format(&self) -> Option<&EncoderFormat> {
        self.format.as_ref()
    }

    /// Configuration unit seen in pull mode, if any
    pub fn config_unit(&self) -> Option<&Bytes> {
        self.config_unit.as_ref()
    }

    pub fn frames_queued(&self) -> u64 {
        self.frames_queued
    }

    pub fn units_emitted(&self) -> u64 {
        self.units_emitted
    }

    /// Configure and start in pull mode
    pub fn start(&mut self, width: u32, height: u32, bitrate: u32) -> Result<(), EncoderError> {
        self.start_backend(width, height, bitrate, None)
    }

    /// Configure and start in push mode with `callback` as the handler
    pub fn start_async(
        &mut self,
        width: u32,
        height: u32,
        bitrate: u32,
        callback: Arc<dyn EncoderCallback>,
    ) -> Result<(), EncoderError> {
        self.start_backend(width, height, bitrate, Some(callback))
    }

    fn start_backend(
        &mut self,
        width: u32,
        height: u32,
        bitrate: u32,
        callback: Option<Arc<dyn EncoderCallback>>,
    ) -> Result<(), EncoderError> {
        self.expect_state(EncoderState::Unconfigured)?;

        let format = EncoderFormat::new(&self.config, width, height, bitrate);
        let mut backend =
            self.factory
                .create(&format)
                .ok_or_else(|| EncoderError::HardwareUnavailable {
                    mime: format.mime.clone(),
                    width,
                    height,
                })?;

        backend.configure(&format)?;
        let push_mode = callback.is_some();
        if callback.is_some() {
            backend.set_callback(callback)?;
        }
        self.transition(EncoderState::Configured);

        if let Err(e) = backend.start() {
            error!("Encoder {} failed to start: {}", backend.name(), e);
            self.transition(EncoderState::Stopped);
            return Err(e);
        }

        info!(
            "Encoder {} running: {} {}x{} @ {} bps, {} fps, I-frame every {}s ({} mode)",
            backend.name(),
            format.mime,
            width,
            height,
            bitrate,
            format.frame_rate,
            format.i_frame_interval_secs,
            if push_mode { "push" } else { "pull" }
        );

        self.backend = Some(backend);
        self.format = Some(format);
        self.started_at = Some(Instant::now());
        self.transition(EncoderState::Running);
        Ok(())
    }

    /// Microseconds since the encoder started
    pub fn pts_us(&self) -> u64 {
        self.started_at
            .map(|started| started.elapsed().as_micros() as u64)
            .unwrap_or(0)
    }

    /// Feed one frame and drain every output that is ready, in order.
    ///
    /// The very first output of a run must begin with a start code,
    /// otherwise the stream cannot be decoded and `MissingConfiguration`
    /// is returned.
    pub fn encode_units(&mut self, raw: &[u8]) -> Result<Vec<EncodedAccessUnit>, EncoderError> {
        self.expect_state(EncoderState::Running)?;
        let pts_us = self.pts_us();
        let timeout = self.config.input_timeout();

        let result = self.feed_and_drain(raw, pts_us, timeout);
        if let Err(e) = &result {
            if e.is_fatal() {
                error!("Encoder failed: {}", e);
                self.transition(EncoderState::Stopped);
            }
        }
        result
    }

    fn feed_and_drain(
        &mut self,
        raw: &[u8],
        pts_us: u64,
        timeout: std::time::Duration,
    ) -> Result<Vec<EncodedAccessUnit>, EncoderError> {
        let backend = self.backend.as_mut().ok_or(EncoderError::InvalidState {
            expected: EncoderState::Running.as_str(),
            actual: EncoderState::Stopped.as_str(),
        })?;

        if backend.queue_input(raw, pts_us, timeout)? {
            self.frames_queued += 1;
        } else {
            debug!("No encoder input buffer within {:?}, frame skipped", timeout);
        }

        let mut units = Vec::new();
        while let Some(unit) = backend.dequeue_output()? {
            if unit.kind == AccessUnitKind::EndOfStream {
                debug!("Encoder signalled end of stream");
                break;
            }

            if !self.first_output_seen {
                if !unit.starts_with_start_code() {
                    return Err(EncoderError::MissingConfiguration {
                        leading: unit.data.iter().take(4).copied().collect(),
                    });
                }
                self.first_output_seen = true;
            }

            if unit.is_config() && self.config_unit.is_none() {
                info!("Encoder configuration unit detected ({} bytes)", unit.data.len());
                self.config_unit = Some(unit.data.clone());
            }

            self.units_emitted += 1;
            units.push(unit);
        }

        trace!("Encoded input at {}us into {} units", pts_us, units.len());
        Ok(units)
    }

    /// Pull-mode encode into a caller buffer: returns the number of bytes
    /// appended to `output`, 0 when nothing was ready.
    pub fn encode(&mut self, raw: &[u8], output: &mut Vec<u8>) -> Result<usize, EncoderError> {
        let units = self.encode_units(raw)?;
        let start = output.len();
        for unit in &units {
            output.extend_from_slice(&unit.data);
        }
        Ok(output.len() - start)
    }

    /// Stop and release the backend. Idempotent.
    pub fn stop(&mut self) -> Result<(), EncoderError> {
        let previous = self.state.set(EncoderState::Stopped);

        let Some(mut backend) = self.backend.take() else {
            if previous != EncoderState::Stopped {
                debug!("Encoder state {} -> stopped", previous);
            }
            return Ok(());
        };

        let result = backend.stop();
        match &result {
            Ok(()) => info!(
                "Encoder {} stopped ({} frames in, {} units out)",
                backend.name(),
                self.frames_queued,
                self.units_emitted
            ),
            Err(e) => warn!("Encoder {} did not stop cleanly: {}", backend.name(), e),
        }
        result
    }

    fn expect_state(&self, expected: EncoderState) -> Result<(), EncoderError> {
        let actual = self.state.get();
        if actual != expected {
            return Err(EncoderError::InvalidState {
                expected: expected.as_str(),
                actual: actual.as_str(),
            });
        }
        Ok(())
    }

    fn transition(&self, next: EncoderState) {
        let previous = self.state.set(next);
        debug!("Encoder state {} -> {}", previous, next);
    }
}

impl Drop for VideoEncoder {
    fn drop(&mut self) {
        if self.backend.is_some() {
            let _ = self.stop();
        }
    }
}
