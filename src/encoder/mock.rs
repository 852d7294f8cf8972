//! Scriptable encoder backend for tests and for running without codec
//! hardware.
//!
//! Pull mode answers every queued input with a picture unit, preceded once
//! by a configuration unit. Push mode does nothing on its own unless
//! auto-drive is enabled; tests drive the callbacks through
//! [`MockEncoderHandle`].

use super::backend::{
    EncodedAccessUnit, EncoderBackend, EncoderCallback, EncoderFactory, EncoderFormat,
    EncoderInput, OutputFormat, START_CODE,
};
use crate::error::EncoderError;
use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, trace};

const SPS: [u8; 4] = [0x67, 0x42, 0x00, 0x1f];
const PPS: [u8; 4] = [0x68, 0xce, 0x3c, 0x80];

/// Behaviour switches for the mock codec
#[derive(Debug, Clone, Default)]
pub struct MockOptions {
    /// Make the first pull-mode output lack a start code
    pub corrupt_first_output: bool,
    /// Refuse every input buffer
    pub reject_input: bool,
    /// Fail `start` with a fatal codec error
    pub fail_start: bool,
    /// In push mode, run the callbacks from a background thread at this period
    pub auto_drive: Option<Duration>,
}

#[derive(Default)]
struct MockState {
    format: Option<EncoderFormat>,
    callback: Option<Arc<dyn EncoderCallback>>,
    running: bool,
    starts: u32,
    stops: u32,
    inputs: Vec<u64>,
    pending: VecDeque<EncodedAccessUnit>,
    config_emitted: bool,
    pictures: u64,
}

/// Shared view into a mock backend, usable after the backend was boxed
#[derive(Clone, Default)]
pub struct MockEncoderHandle {
    state: Arc<Mutex<MockState>>,
    options: MockOptions,
}

impl MockEncoderHandle {
    pub fn new(options: MockOptions) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            options,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub fn start_count(&self) -> u32 {
        self.state.lock().starts
    }

    pub fn stop_count(&self) -> u32 {
        self.state.lock().stops
    }

    /// Presentation times of accepted pull-mode inputs
    pub fn inputs(&self) -> Vec<u64> {
        self.state.lock().inputs.clone()
    }

    pub fn configured_format(&self) -> Option<EncoderFormat> {
        self.state.lock().format.clone()
    }

    pub fn has_callback(&self) -> bool {
        self.state.lock().callback.is_some()
    }

    fn callback(&self) -> Option<Arc<dyn EncoderCallback>> {
        self.state.lock().callback.clone()
    }

    /// Ask the installed handler for input, as a codec with a free buffer would
    pub fn request_input(&self) -> Option<EncoderInput> {
        self.callback().map(|callback| callback.on_input_ready())
    }

    pub fn emit_output(&self, unit: EncodedAccessUnit) {
        if let Some(callback) = self.callback() {
            callback.on_output_ready(unit);
        }
    }

    pub fn emit_format(&self, format: OutputFormat) {
        if let Some(callback) = self.callback() {
            callback.on_format_changed(format);
        }
    }

    pub fn emit_error(&self, error: EncoderError) {
        if let Some(callback) = self.callback() {
            callback.on_error(error);
        }
    }

    /// Parameter sets as a real codec would report them
    pub fn parameter_sets() -> OutputFormat {
        OutputFormat {
            csd0: Some(nal(&SPS)),
            csd1: Some(nal(&PPS)),
        }
    }

    /// Picture unit the mock produces for its `index`-th frame
    pub fn picture(&self, index: u64, pts_us: u64) -> EncodedAccessUnit {
        let keyframe = index % self.keyframe_interval() == 0;
        let nal_type = if keyframe { 0x65 } else { 0x41 };
        let mut data = BytesMut::with_capacity(16);
        data.put_slice(&START_CODE);
        data.put_u8(nal_type);
        data.put_u64(index);
        EncodedAccessUnit::picture(data.freeze(), keyframe, pts_us)
    }

    fn keyframe_interval(&self) -> u64 {
        self.state
            .lock()
            .format
            .as_ref()
            .map(|f| (f.frame_rate as u64 * f.i_frame_interval_secs as u64).max(1))
            .unwrap_or(30)
    }

    /// One push-mode cycle: announce the format once, then turn one input
    /// request into one output. An input request that finds nothing ready
    /// is retried on the next cycle. Returns false after end of stream.
    pub fn drive_once(&self) -> bool {
        let announce = {
            let mut state = self.state.lock();
            !std::mem::replace(&mut state.config_emitted, true)
        };
        if announce {
            self.emit_format(Self::parameter_sets());
        }

        match self.request_input() {
            Some(EncoderInput::Frame { pts_us, .. }) => {
                let index = {
                    let mut state = self.state.lock();
                    state.pictures += 1;
                    state.pictures - 1
                };
                self.emit_output(self.picture(index, pts_us));
                true
            }
            Some(EncoderInput::NotReady) => {
                trace!("Mock encoder input not ready, asking again next cycle");
                true
            }
            Some(EncoderInput::EndOfStream) => {
                self.emit_output(EncodedAccessUnit::end_of_stream(0));
                false
            }
            None => false,
        }
    }
}

fn nal(payload: &[u8]) -> Bytes {
    let mut data = BytesMut::with_capacity(START_CODE.len() + payload.len());
    data.put_slice(&START_CODE);
    data.put_slice(payload);
    data.freeze()
}

pub struct MockEncoderBackend {
    handle: MockEncoderHandle,
    driver_stop: Arc<AtomicBool>,
    driver: Option<JoinHandle<()>>,
}

impl MockEncoderBackend {
    pub fn new(handle: MockEncoderHandle) -> Self {
        Self {
            handle,
            driver_stop: Arc::new(AtomicBool::new(false)),
            driver: None,
        }
    }

    fn spawn_driver(&mut self, period: Duration) {
        let handle = self.handle.clone();
        let stop = Arc::clone(&self.driver_stop);
        stop.store(false, Ordering::Release);
        self.driver = Some(std::thread::spawn(move || {
            while !stop.load(Ordering::Acquire) {
                std::thread::sleep(period);
                if stop.load(Ordering::Acquire) || !handle.drive_once() {
                    break;
                }
            }
            debug!("Mock encoder driver stopped");
        }));
    }
}

impl EncoderBackend for MockEncoderBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn configure(&mut self, format: &EncoderFormat) -> Result<(), EncoderError> {
        if format.width == 0 || format.height == 0 {
            return Err(EncoderError::Configuration {
                details: format!("invalid size {}x{}", format.width, format.height),
            });
        }
        let mut state = self.handle.state.lock();
        state.format = Some(format.clone());
        state.config_emitted = false;
        state.pictures = 0;
        state.pending.clear();
        Ok(())
    }

    fn set_callback(
        &mut self,
        callback: Option<Arc<dyn EncoderCallback>>,
    ) -> Result<(), EncoderError> {
        self.handle.state.lock().callback = callback;
        Ok(())
    }

    fn start(&mut self) -> Result<(), EncoderError> {
        if self.handle.options.fail_start {
            return Err(EncoderError::Codec {
                details: "mock codec refused to start".to_string(),
                fatal: true,
            });
        }

        let push_mode = {
            let mut state = self.handle.state.lock();
            state.running = true;
            state.starts += 1;
            state.callback.is_some()
        };

        if let (true, Some(period)) = (push_mode, self.handle.options.auto_drive) {
            self.spawn_driver(period);
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), EncoderError> {
        self.driver_stop.store(true, Ordering::Release);
        if let Some(driver) = self.driver.take() {
            let _ = driver.join();
        }

        let mut state = self.handle.state.lock();
        state.running = false;
        state.stops += 1;
        state.callback = None;
        Ok(())
    }

    fn queue_input(
        &mut self,
        data: &[u8],
        pts_us: u64,
        _timeout: Duration,
    ) -> Result<bool, EncoderError> {
        if self.handle.options.reject_input {
            return Ok(false);
        }

        let mut state = self.handle.state.lock();
        if !state.running {
            return Err(EncoderError::InvalidState {
                expected: "running",
                actual: "stopped",
            });
        }

        if !state.config_emitted {
            state.config_emitted = true;
            let config = if self.handle.options.corrupt_first_output {
                Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef])
            } else {
                let mut unit = BytesMut::new();
                unit.put_slice(&nal(&SPS));
                unit.put_slice(&nal(&PPS));
                unit.freeze()
            };
            state.pending.push_back(EncodedAccessUnit::config(config, pts_us));
        }

        state.inputs.push(pts_us);
        let index = state.pictures;
        state.pictures += 1;
        drop(state);

        let picture = self.handle.picture(index, pts_us);
        trace!("Mock encoder took {} bytes at {}us", data.len(), pts_us);
        self.handle.state.lock().pending.push_back(picture);
        Ok(true)
    }

    fn dequeue_output(&mut self) -> Result<Option<EncodedAccessUnit>, EncoderError> {
        Ok(self.handle.state.lock().pending.pop_front())
    }
}

impl Drop for MockEncoderBackend {
    fn drop(&mut self) {
        self.driver_stop.store(true, Ordering::Release);
        if let Some(driver) = self.driver.take() {
            let _ = driver.join();
        }
    }
}

/// Factory handing out mock backends that share one handle
pub struct MockEncoderFactory {
    handle: MockEncoderHandle,
    available: bool,
}

impl MockEncoderFactory {
    pub fn new(handle: MockEncoderHandle) -> Self {
        Self {
            handle,
            available: true,
        }
    }

    /// A factory that finds no encoder for any format
    pub fn unavailable() -> Self {
        Self {
            handle: MockEncoderHandle::default(),
            available: false,
        }
    }

    pub fn handle(&self) -> &MockEncoderHandle {
        &self.handle
    }
}

impl EncoderFactory for MockEncoderFactory {
    fn create(&self, format: &EncoderFormat) -> Option<Box<dyn EncoderBackend>> {
        if !self.available {
            return None;
        }
        debug!(
            "Creating mock encoder for {} {}x{}",
            format.mime, format.width, format.height
        );
        Some(Box::new(MockEncoderBackend::new(self.handle.clone())))
    }
}
