use super::*;
use std::sync::Arc;
use std::time::Duration;

fn approx(a: &[f32], b: &[f32]) -> bool {
    a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-5)
}

#[test]
fn test_identity_pose() {
    assert_eq!(pose_matrix([0.0; 3], [0.0, 0.0, 0.0, 1.0]), IDENTITY_POSE);
    // Degenerate quaternion falls back to no rotation
    assert_eq!(pose_matrix([0.0; 3], [0.0; 4]), IDENTITY_POSE);
}

#[test]
fn test_translation_is_last_column() {
    let m = pose_matrix([1.0, 2.0, 3.0], [0.0, 0.0, 0.0, 1.0]);
    assert_eq!(&m[12..16], &[1.0, 2.0, 3.0, 1.0]);
}

#[test]
fn test_rotation_about_z() {
    // 90 degrees about Z maps +X onto +Y
    let half = std::f32::consts::FRAC_PI_4;
    let m = pose_matrix([0.0; 3], [0.0, 0.0, half.sin(), half.cos()]);

    // First column is the image of the X axis
    assert!(approx(&m[0..4], &[0.0, 1.0, 0.0, 0.0]));
    assert!(approx(&m[4..8], &[-1.0, 0.0, 0.0, 0.0]));
    assert!(approx(&m[8..12], &[0.0, 0.0, 1.0, 0.0]));
}

#[test]
fn test_unnormalized_quaternion() {
    let unit = pose_matrix([0.0; 3], [0.0, 0.6, 0.0, 0.8]);
    let scaled = pose_matrix([0.0; 3], [0.0, 3.0, 0.0, 4.0]);
    assert!(approx(&unit, &scaled));
}

#[test]
fn test_assembler_emits_on_accelerometer_only() {
    let source = Arc::new(StaticPoseSource::new([0.5, 0.0, 0.0], [0.0, 0.0, 0.0, 1.0]));
    let assembler = PoseAssembler::new(source);

    assert!(assembler
        .on_reading(SensorReading::new(SensorKind::Gyroscope, [1.0, 2.0, 3.0]))
        .is_none());
    assert!(assembler
        .on_reading(SensorReading::new(SensorKind::Magnetometer, [4.0, 5.0, 6.0]))
        .is_none());

    let sample = assembler
        .on_reading(SensorReading::new(SensorKind::Accelerometer, [0.0, 9.8, 0.0]))
        .unwrap();

    assert_eq!(sample.accelerometer, [0.0, 9.8, 0.0]);
    assert_eq!(sample.gyroscope, [1.0, 2.0, 3.0]);
    assert_eq!(sample.magnetometer, [4.0, 5.0, 6.0]);
    assert_eq!(sample.pose[12], 0.5);
    assert_eq!(assembler.sample_count(), 1);
}

#[test]
fn test_assembler_reads_pose_at_emit_time() {
    let source = Arc::new(StaticPoseSource::identity());
    let assembler = PoseAssembler::new(Arc::clone(&source) as Arc<dyn PoseSource>);

    let accel = SensorReading::new(SensorKind::Accelerometer, [0.0; 3]);
    assert_eq!(assembler.on_reading(accel).unwrap().pose, IDENTITY_POSE);

    source.set([0.0, 1.0, 0.0], [0.0, 0.0, 0.0, 1.0]);
    assert_eq!(assembler.on_reading(accel).unwrap().pose[13], 1.0);
}

#[tokio::test]
async fn test_synthetic_imu_delivers_readings() {
    let imu = SyntheticImu::new(200);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    imu.start(Arc::new(move |reading| {
        let _ = tx.send(reading);
    }))
    .await
    .unwrap();

    let mut kinds = Vec::new();
    for _ in 0..3 {
        let reading = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        kinds.push(reading.kind);
    }
    imu.stop().await.unwrap();

    assert_eq!(
        kinds,
        vec![
            SensorKind::Gyroscope,
            SensorKind::Magnetometer,
            SensorKind::Accelerometer
        ]
    );
    assert!(imu.tick_count() >= 1);
}
