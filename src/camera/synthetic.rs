use super::interface::{CaptureSource, FrameCallback};
use super::resolution::choose_optimal_size;
use crate::config::CameraConfig;
use crate::error::{CameraError, Result};
use crate::frame::{Plane, RawFrame};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Timer-driven camera producing a moving luma gradient.
///
/// Frames are packed NV21 by default. In planar mode the source mimics a
/// device handing out semi-planar chroma views (pixel stride 2) with padded
/// rows, which exercises the chroma boundary patch on the raw path.
pub struct SyntheticCamera {
    index: u32,
    resolution: (u32, u32),
    fps: u32,
    planar: bool,
    frame_counter: Arc<AtomicU64>,
    is_running: Arc<AtomicBool>,
    capture_task: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl SyntheticCamera {
    pub fn new(config: &CameraConfig) -> Result<Self> {
        let resolution =
            choose_optimal_size(&config.supported_resolutions, config.preferred_resolution)
                .ok_or_else(|| CameraError::Unavailable {
                    index: config.index,
                    details: "no supported capture sizes".to_string(),
                })?;

        if resolution != config.preferred_resolution {
            info!(
                "Camera {} does not offer {}x{}, using {}x{}",
                config.index,
                config.preferred_resolution.0,
                config.preferred_resolution.1,
                resolution.0,
                resolution.1
            );
        }

        Ok(Self {
            index: config.index,
            resolution,
            fps: config.fps.max(1),
            planar: false,
            frame_counter: Arc::new(AtomicU64::new(0)),
            is_running: Arc::new(AtomicBool::new(false)),
            capture_task: tokio::sync::Mutex::new(None),
        })
    }

    /// Deliver three-plane frames instead of packed NV21
    pub fn planar(mut self, planar: bool) -> Self {
        self.planar = planar;
        self
    }

    /// Frames generated so far
    pub fn frame_count(&self) -> u64 {
        self.frame_counter.load(Ordering::Relaxed)
    }

    fn generate(sequence: u64, (width, height): (u32, u32), planar: bool) -> RawFrame {
        let shift = (sequence % 256) as u8;
        let (w, h) = (width as usize, height as usize);

        if !planar {
            let mut data = Vec::with_capacity(w * h * 3 / 2);
            for row in 0..h {
                data.extend((0..w).map(|col| (col + row) as u8 ^ shift));
            }
            data.resize(w * h * 3 / 2, 128);
            return RawFrame::packed(sequence, width, height, data);
        }

        // Rows padded to a 64-byte boundary like typical camera hardware
        let stride = (w + 63) & !63;
        let mut luma = vec![0u8; stride * h];
        for row in 0..h {
            for col in 0..w {
                luma[row * stride + col] = (col + row) as u8 ^ shift;
            }
        }

        // U and V are overlapping views of one interleaved buffer, offset by
        // one byte, each one byte short of the full region
        let chroma_len = stride * (h / 2);
        let interleaved: Vec<u8> = (0..chroma_len)
            .map(|i| if i % 2 == 0 { 128 } else { shift })
            .collect();
        let view = chroma_len.saturating_sub(1);
        let u = Plane::new(
            interleaved.get(1..).map(<[u8]>::to_vec).unwrap_or_default(),
            stride as u32,
            2,
        );
        let v = Plane::new(interleaved[..view].to_vec(), stride as u32, 2);

        RawFrame::planar(
            sequence,
            width,
            height,
            Plane::new(luma, stride as u32, 1),
            u,
            v,
        )
    }
}

#[async_trait]
impl CaptureSource for SyntheticCamera {
    async fn start(&self, callback: FrameCallback) -> Result<()> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return Err(CameraError::AlreadyStarted.into());
        }

        let resolution = self.resolution;
        let planar = self.planar;
        let is_running = Arc::clone(&self.is_running);
        let frame_counter = Arc::clone(&self.frame_counter);
        let frame_interval = Duration::from_micros(1_000_000 / self.fps as u64);

        info!(
            "Starting synthetic camera {} ({}x{} @ {}fps, {})",
            self.index,
            resolution.0,
            resolution.1,
            self.fps,
            if planar { "planar" } else { "nv21" }
        );

        let task = tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(frame_interval);

            while is_running.load(Ordering::Relaxed) {
                interval_timer.tick().await;
                if !is_running.load(Ordering::Relaxed) {
                    break;
                }

                let sequence = frame_counter.fetch_add(1, Ordering::Relaxed);
                let frame = Self::generate(sequence, resolution, planar);
                trace!(
                    "Generated synthetic frame {} ({} bytes)",
                    sequence,
                    frame.byte_len()
                );
                callback(frame);
            }

            debug!("Synthetic capture loop stopped");
        });

        *self.capture_task.lock().await = Some(task);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if !self.is_running.swap(false, Ordering::SeqCst) {
            debug!("Synthetic camera is not running");
            return Ok(());
        }

        if let Some(task) = self.capture_task.lock().await.take() {
            match tokio::time::timeout(Duration::from_secs(3), task).await {
                Ok(Ok(())) => debug!("Synthetic capture task completed"),
                Ok(Err(e)) => error!("Error waiting for synthetic capture task: {}", e),
                Err(_) => warn!("Synthetic capture task did not complete within timeout"),
            }
        }

        info!("Synthetic camera {} stopped", self.index);
        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    fn is_capturing(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }
}
