use super::source::{PoseSource, SensorKind, SensorReading};
use crate::protocol::PoseSample;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

#[derive(Debug, Default, Clone, Copy)]
struct LatestReadings {
    accelerometer: [f32; 3],
    gyroscope: [f32; 3],
    magnetometer: [f32; 3],
}

/// Combines the head pose with the most recent IMU readings.
///
/// A sample is produced on every accelerometer reading; gyroscope and
/// magnetometer readings only update the stored values.
pub struct PoseAssembler {
    pose_source: Arc<dyn PoseSource>,
    latest: Mutex<LatestReadings>,
    samples: AtomicU64,
}

impl PoseAssembler {
    pub fn new(pose_source: Arc<dyn PoseSource>) -> Self {
        Self {
            pose_source,
            latest: Mutex::new(LatestReadings::default()),
            samples: AtomicU64::new(0),
        }
    }

    /// Record a reading, returning a sample when it should be sent
    pub fn on_reading(&self, reading: SensorReading) -> Option<PoseSample> {
        let latest = {
            let mut latest = self.latest.lock();
            match reading.kind {
                SensorKind::Accelerometer => latest.accelerometer = reading.values,
                SensorKind::Gyroscope => latest.gyroscope = reading.values,
                SensorKind::Magnetometer => latest.magnetometer = reading.values,
            }
            *latest
        };

        if reading.kind != SensorKind::Accelerometer {
            return None;
        }

        let count = self.samples.fetch_add(1, Ordering::Relaxed) + 1;
        trace!("Assembled pose sample {}", count);

        Some(PoseSample {
            pose: self.pose_source.head_pose(),
            accelerometer: latest.accelerometer,
            gyroscope: latest.gyroscope,
            magnetometer: latest.magnetometer,
        })
    }

    /// Samples emitted since creation
    pub fn sample_count(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }
}
