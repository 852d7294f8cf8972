mod assembler;
mod matrix;
mod source;
#[cfg(test)]
mod tests;

pub use crate::protocol::PoseSample;
pub use assembler::PoseAssembler;
pub use matrix::{pose_matrix, IDENTITY_POSE};
pub use source::{
    PoseSource, ReadingCallback, SensorKind, SensorReading, SensorSource, StaticPoseSource,
    SyntheticImu,
};
