use super::matrix::{pose_matrix, IDENTITY_POSE};
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Inertial sensors forwarded on the sensor channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    Accelerometer,
    Gyroscope,
    Magnetometer,
}

/// One sensor callback delivery
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub kind: SensorKind,
    pub values: [f32; 3],
}

impl SensorReading {
    pub fn new(kind: SensorKind, values: [f32; 3]) -> Self {
        Self { kind, values }
    }
}

/// Head-tracking library, queried for the current 4x4 pose on demand
pub trait PoseSource: Send + Sync {
    fn head_pose(&self) -> [f32; 16];
}

/// Pose source returning whatever pose was last stored
#[derive(Debug)]
pub struct StaticPoseSource {
    pose: RwLock<[f32; 16]>,
}

impl StaticPoseSource {
    pub fn new(position: [f32; 3], orientation: [f32; 4]) -> Self {
        Self {
            pose: RwLock::new(pose_matrix(position, orientation)),
        }
    }

    pub fn identity() -> Self {
        Self {
            pose: RwLock::new(IDENTITY_POSE),
        }
    }

    /// Replace the reported pose
    pub fn set(&self, position: [f32; 3], orientation: [f32; 4]) {
        *self.pose.write() = pose_matrix(position, orientation);
    }
}

impl PoseSource for StaticPoseSource {
    fn head_pose(&self) -> [f32; 16] {
        *self.pose.read()
    }
}

pub type ReadingCallback = Arc<dyn Fn(SensorReading) + Send + Sync>;

/// Device IMU delivering readings through a callback
#[async_trait]
pub trait SensorSource: Send + Sync {
    async fn start(&self, callback: ReadingCallback) -> Result<()>;
    async fn stop(&self) -> Result<()>;
}

/// Timer-driven IMU producing a slowly rocking gravity vector
pub struct SyntheticImu {
    rate_hz: u32,
    is_running: Arc<AtomicBool>,
    tick_counter: Arc<AtomicU64>,
    task: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl SyntheticImu {
    pub fn new(rate_hz: u32) -> Self {
        Self {
            rate_hz: rate_hz.max(1),
            is_running: Arc::new(AtomicBool::new(false)),
            tick_counter: Arc::new(AtomicU64::new(0)),
            task: tokio::sync::Mutex::new(None),
        }
    }

    /// Number of accelerometer readings produced so far
    pub fn tick_count(&self) -> u64 {
        self.tick_counter.load(Ordering::Relaxed)
    }

    fn readings(tick: u64) -> [SensorReading; 3] {
        let phase = tick as f32 * 0.05;
        [
            SensorReading::new(SensorKind::Gyroscope, [0.1 * phase.cos(), 0.0, 0.0]),
            SensorReading::new(SensorKind::Magnetometer, [22.0, -5.0, 40.0]),
            // Accelerometer last so it carries the other two readings with it
            SensorReading::new(
                SensorKind::Accelerometer,
                [0.0, 9.81 * phase.cos(), 9.81 * phase.sin()],
            ),
        ]
    }
}

#[async_trait]
impl SensorSource for SyntheticImu {
    async fn start(&self, callback: ReadingCallback) -> Result<()> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            warn!("Synthetic IMU is already running");
            return Ok(());
        }

        let period = Duration::from_micros(1_000_000 / self.rate_hz as u64);
        let is_running = Arc::clone(&self.is_running);
        let tick_counter = Arc::clone(&self.tick_counter);

        info!("Starting synthetic IMU at {} Hz", self.rate_hz);

        let task = tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(period);

            while is_running.load(Ordering::Relaxed) {
                interval_timer.tick().await;
                if !is_running.load(Ordering::Relaxed) {
                    break;
                }

                let tick = tick_counter.fetch_add(1, Ordering::Relaxed);
                for reading in Self::readings(tick) {
                    callback(reading);
                }
                trace!("Synthetic IMU tick {}", tick);
            }

            debug!("Synthetic IMU loop stopped");
        });

        *self.task.lock().await = Some(task);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if !self.is_running.swap(false, Ordering::SeqCst) {
            debug!("Synthetic IMU is not running");
            return Ok(());
        }

        if let Some(task) = self.task.lock().await.take() {
            match tokio::time::timeout(Duration::from_secs(1), task).await {
                Ok(Ok(())) => debug!("Synthetic IMU task completed"),
                Ok(Err(e)) => error!("Error waiting for synthetic IMU task: {}", e),
                Err(_) => warn!("Synthetic IMU task did not complete within timeout"),
            }
        }

        info!("Synthetic IMU stopped");
        Ok(())
    }
}
