use super::*;
use crate::config::CameraConfig;
use crate::frame::{FrameBuffer, RawFrame};
use crate::frame_slot::FrameSlot;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

fn create_test_camera_config() -> CameraConfig {
    CameraConfig {
        index: 0,
        preferred_resolution: (64, 48),
        fps: 100,
        supported_resolutions: vec![(64, 48), (128, 96)],
    }
}

fn frame(sequence: u64) -> RawFrame {
    RawFrame::packed(sequence, 640, 480, vec![0u8; 640 * 480 * 3 / 2])
}

/// Holds on to the guard until told to let go
#[derive(Default)]
struct HoldingSink {
    held: Mutex<Vec<(u64, ProcessingGuard)>>,
}

impl HoldingSink {
    fn release(&self) {
        self.held.lock().clear();
    }
}

impl FrameSink for HoldingSink {
    fn process(&self, frame: Arc<RawFrame>, guard: ProcessingGuard) {
        self.held.lock().push((frame.sequence, guard));
    }
}

#[test]
fn test_choose_exact_size() {
    let choices = [(640, 480), (1280, 960), (1920, 1080)];
    assert_eq!(choose_optimal_size(&choices, (1280, 960)), Some((1280, 960)));
}

#[test]
fn test_choose_smallest_big_enough() {
    let choices = [(1920, 1080), (320, 240), (1280, 720), (800, 600)];
    // min edge 700: only 1920x1080 and 1280x720 qualify, 1280x720 is smaller
    assert_eq!(choose_optimal_size(&choices, (1000, 700)), Some((1280, 720)));
}

#[test]
fn test_choose_enforces_minimum_edge() {
    let choices = [(320, 240), (352, 288), (640, 480)];
    // Requested edge 100 is raised to 320, so 240-tall sizes are too small
    assert_eq!(choose_optimal_size(&choices, (160, 100)), Some((640, 480)));
}

#[test]
fn test_choose_falls_back_to_first() {
    let choices = [(176, 144), (320, 240)];
    assert_eq!(choose_optimal_size(&choices, (1280, 960)), Some((176, 144)));
    assert_eq!(choose_optimal_size(&[], (1280, 960)), None);
}

#[test]
fn test_accepted_frame_reaches_slot_and_sink() {
    let slot = Arc::new(FrameSlot::new());
    let adapter = CaptureAdapter::new(Arc::clone(&slot));
    let sink = Arc::new(HoldingSink::default());
    adapter.set_sink(Some(sink.clone() as Arc<dyn FrameSink>));

    assert_eq!(adapter.deliver(frame(1)), Delivery::Accepted { dropped_before: 0 });
    assert_eq!(slot.take_snapshot().unwrap().sequence, 1);
    assert_eq!(sink.held.lock().len(), 1);
    assert!(adapter.is_processing());

    sink.release();
    assert!(!adapter.is_processing());
}

#[test]
fn test_busy_delivery_drops_without_touching_slot() {
    let slot = Arc::new(FrameSlot::new());
    let adapter = CaptureAdapter::new(Arc::clone(&slot));
    let sink = Arc::new(HoldingSink::default());
    adapter.set_sink(Some(sink.clone() as Arc<dyn FrameSink>));

    adapter.deliver(frame(1));
    let published = slot.stats().published;

    assert_eq!(adapter.deliver(frame(2)), Delivery::Dropped);
    assert_eq!(adapter.pending_drops(), 1);
    assert_eq!(slot.stats().published, published);
    assert_eq!(slot.take_snapshot().unwrap().sequence, 1);

    // Next accepted frame reports and resets the count
    sink.release();
    assert_eq!(adapter.deliver(frame(3)), Delivery::Accepted { dropped_before: 1 });
    assert_eq!(adapter.pending_drops(), 0);
    assert_eq!(
        adapter.stats(),
        CaptureStats {
            accepted: 2,
            dropped_total: 1
        }
    );
}

#[test]
fn test_without_sink_guard_is_released_immediately() {
    let adapter = CaptureAdapter::new(Arc::new(FrameSlot::new()));

    adapter.deliver(frame(1));
    assert_eq!(adapter.deliver(frame(2)), Delivery::Accepted { dropped_before: 0 });
    assert_eq!(adapter.slot().take_snapshot().unwrap().sequence, 2);
}

#[tokio::test]
async fn test_synthetic_camera_delivers_frames() {
    let camera = SyntheticCamera::new(&create_test_camera_config()).unwrap();
    assert_eq!(camera.resolution(), (64, 48));
    assert!(!camera.is_capturing());

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    camera
        .start(Arc::new(move |frame| {
            let _ = tx.send(frame);
        }))
        .await
        .unwrap();
    assert!(camera.is_capturing());

    let first = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    camera.stop().await.unwrap();

    assert_eq!(first.sequence, 0);
    assert_eq!((first.width, first.height), (64, 48));
    assert_eq!(first.byte_len(), 64 * 48 * 3 / 2);
    assert!(!camera.is_capturing());
}

#[tokio::test]
async fn test_synthetic_camera_rejects_double_start() {
    let camera = SyntheticCamera::new(&create_test_camera_config()).unwrap();
    let callback: FrameCallback = Arc::new(|_| {});

    camera.start(Arc::clone(&callback)).await.unwrap();
    let second = camera.start(callback).await;
    camera.stop().await.unwrap();

    assert!(matches!(
        second,
        Err(crate::error::XrLinkError::Camera(
            crate::error::CameraError::AlreadyStarted
        ))
    ));
}

#[tokio::test]
async fn test_synthetic_planar_layout() {
    let camera = SyntheticCamera::new(&create_test_camera_config())
        .unwrap()
        .planar(true);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    camera
        .start(Arc::new(move |frame| {
            let _ = tx.send(frame);
        }))
        .await
        .unwrap();
    let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    camera.stop().await.unwrap();

    assert_eq!(frame.row_stride(), 64);
    match &frame.buffer {
        FrameBuffer::Planar { y, u, v } => {
            assert_eq!(y.data.len(), 64 * 48);
            assert_eq!(u.pixel_stride, 2);
            assert_eq!(u.data.len(), 64 * 24 - 1);
            assert_eq!(v.data.len(), 64 * 24 - 1);
        }
        FrameBuffer::Packed(_) => panic!("expected planar frame"),
    }
}

#[test]
fn test_unavailable_without_sizes() {
    let mut config = create_test_camera_config();
    config.supported_resolutions.clear();

    assert!(matches!(
        SyntheticCamera::new(&config),
        Err(crate::error::XrLinkError::Camera(
            crate::error::CameraError::Unavailable { index: 0, .. }
        ))
    ));
}
