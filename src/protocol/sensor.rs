use crate::error::ProtocolError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Floats per sensor packet: 16 pose + 3 accelerometer + 3 gyroscope + 3 magnetometer
const SENSOR_FLOATS: usize = 16 + 3 * 3;

/// Size of one sensor packet on the wire
pub const SENSOR_SAMPLE_LEN: usize = SENSOR_FLOATS * 4;

/// Head pose plus the latest inertial readings at the time it was taken
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PoseSample {
    /// 4x4 head pose, column-major
    pub pose: [f32; 16],
    pub accelerometer: [f32; 3],
    pub gyroscope: [f32; 3],
    pub magnetometer: [f32; 3],
}

pub fn encode_sensor_sample(sample: &PoseSample) -> Bytes {
    let mut buf = BytesMut::with_capacity(SENSOR_SAMPLE_LEN);
    sample
        .pose
        .iter()
        .chain(sample.accelerometer.iter())
        .chain(sample.gyroscope.iter())
        .chain(sample.magnetometer.iter())
        .for_each(|value| buf.put_f32(*value));
    buf.freeze()
}

pub fn decode_sensor_sample(mut buf: &[u8]) -> Result<PoseSample, ProtocolError> {
    if buf.len() < SENSOR_SAMPLE_LEN {
        return Err(ProtocolError::Truncated {
            needed: SENSOR_SAMPLE_LEN,
            available: buf.len(),
        });
    }

    let mut sample = PoseSample::default();
    for value in sample
        .pose
        .iter_mut()
        .chain(sample.accelerometer.iter_mut())
        .chain(sample.gyroscope.iter_mut())
        .chain(sample.magnetometer.iter_mut())
    {
        *value = buf.get_f32();
    }
    Ok(sample)
}
