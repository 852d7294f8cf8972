use super::*;
use crate::config::StreamConfig;
use crate::encoder::EncodedAccessUnit;
use crate::error::{TransportError, XrLinkError};
use crate::protocol::{
    decode_sensor_sample, encode_video_frame, read_video_frame, PoseSample, WireFormat,
    WireFrameHeader, SENSOR_SAMPLE_LEN,
};
use bytes::Bytes;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::time::timeout;

struct Receiver {
    video: TcpListener,
    sensor: TcpListener,
}

impl Receiver {
    async fn bind() -> Self {
        Self {
            video: TcpListener::bind("127.0.0.1:0").await.unwrap(),
            sensor: TcpListener::bind("127.0.0.1:0").await.unwrap(),
        }
    }

    fn config(&self, transport: TransportPreference) -> StreamConfig {
        self.config_with_capacity(transport, 8)
    }

    fn config_with_capacity(&self, transport: TransportPreference, capacity: usize) -> StreamConfig {
        StreamConfig {
            host: "127.0.0.1".to_string(),
            video_port: self.video.local_addr().unwrap().port(),
            sensor_port: self.sensor.local_addr().unwrap().port(),
            transport,
            connect_timeout_ms: 1000,
            send_queue_capacity: capacity,
        }
    }

    async fn accept(&self) -> (TcpStream, TcpStream) {
        let (video, _) = timeout(Duration::from_secs(1), self.video.accept())
            .await
            .unwrap()
            .unwrap();
        let (sensor, _) = timeout(Duration::from_secs(1), self.sensor.accept())
            .await
            .unwrap()
            .unwrap();
        (video, sensor)
    }
}

async fn assert_eof(stream: &mut TcpStream) {
    let mut buf = [0u8; 64];
    let read = timeout(Duration::from_secs(1), stream.read(&mut buf))
        .await
        .expect("peer should observe the close")
        .unwrap_or(0);
    assert_eq!(read, 0);
}

#[test]
fn test_select_mode() {
    let loopback: SocketAddr = "127.0.0.1:50000".parse().unwrap();
    let loopback6: SocketAddr = "[::1]:50000".parse().unwrap();
    let remote: SocketAddr = "192.168.1.20:50000".parse().unwrap();

    assert_eq!(select_mode(&loopback, TransportPreference::Udp), TransportMode::Tcp);
    assert_eq!(select_mode(&loopback6, TransportPreference::Auto), TransportMode::Tcp);
    assert_eq!(select_mode(&remote, TransportPreference::Auto), TransportMode::Udp);
    assert_eq!(select_mode(&remote, TransportPreference::Udp), TransportMode::Udp);
    assert_eq!(select_mode(&remote, TransportPreference::Tcp), TransportMode::Tcp);
}

#[tokio::test]
async fn test_loopback_forces_tcp() {
    let receiver = Receiver::bind().await;
    let session = TransportSession::connect(&receiver.config(TransportPreference::Udp))
        .await
        .unwrap();
    let (_video, _sensor) = receiver.accept().await;

    assert_eq!(session.mode(), TransportMode::Tcp);
    assert!(session.is_connected());
    assert_eq!(session.video_addr(), receiver.video.local_addr().unwrap());
}

#[tokio::test]
async fn test_video_and_sensor_delivery() {
    let receiver = Receiver::bind().await;
    let session = TransportSession::connect(&receiver.config(TransportPreference::Auto))
        .await
        .unwrap();
    let (mut video, mut sensor) = receiver.accept().await;

    let config = EncodedAccessUnit::config(Bytes::from_static(&[0, 0, 0, 1, 0x67, 0x68]), 0);
    let picture = EncodedAccessUnit::picture(Bytes::from_static(&[0, 0, 0, 1, 0x65]), true, 33);
    assert!(session.send_access_unit(&config, 1280, 960));
    assert!(session.send_access_unit(&picture, 1280, 960));

    let mut sample = PoseSample::default();
    sample.accelerometer = [0.0, 9.81, 0.0];
    assert!(session.send_sample(&sample));

    let (header, payload) = read_video_frame(&mut video).await.unwrap();
    assert_eq!(header.format, WireFormat::Encoded);
    assert!(header.keyframe);
    assert_eq!((header.width, header.height), (1280, 960));
    assert_eq!(&payload[..], &[0, 0, 0, 1, 0x67, 0x68]);

    let (_, payload) = read_video_frame(&mut video).await.unwrap();
    assert_eq!(&payload[..], &[0, 0, 0, 1, 0x65]);

    let mut packet = [0u8; SENSOR_SAMPLE_LEN];
    sensor.read_exact(&mut packet).await.unwrap();
    assert_eq!(decode_sensor_sample(&packet).unwrap(), sample);

    assert!(session.config_sent());
    let stats = session.stats();
    assert_eq!(stats.video.sent, 2);
    assert_eq!(stats.sensor.sent, 1);
    assert_eq!(stats.gated, 0);
}

#[tokio::test]
async fn test_picture_before_config_is_gated() {
    let receiver = Receiver::bind().await;
    let session = TransportSession::connect(&receiver.config(TransportPreference::Tcp))
        .await
        .unwrap();
    let (mut video, _sensor) = receiver.accept().await;

    let early = EncodedAccessUnit::picture(Bytes::from_static(&[0, 0, 0, 1, 0x41]), false, 10);
    assert!(!session.send_access_unit(&early, 640, 480));
    assert!(!session.config_sent());

    let config = EncodedAccessUnit::config(Bytes::from_static(&[0, 0, 0, 1, 0x67]), 20);
    let later = EncodedAccessUnit::picture(Bytes::from_static(&[0, 0, 0, 1, 0x41, 0x01]), false, 30);
    assert!(session.send_access_unit(&config, 640, 480));
    assert!(session.send_access_unit(&later, 640, 480));

    // The gated picture never reaches the wire: configuration comes first
    let (first, payload) = read_video_frame(&mut video).await.unwrap();
    assert!(first.keyframe);
    assert_eq!(&payload[..], &[0, 0, 0, 1, 0x67]);
    let (second, payload) = read_video_frame(&mut video).await.unwrap();
    assert!(!second.keyframe);
    assert_eq!(&payload[..], &[0, 0, 0, 1, 0x41, 0x01]);

    assert_eq!(session.stats().gated, 1);
}

#[tokio::test]
async fn test_full_queue_drops_and_counts() {
    let receiver = Receiver::bind().await;
    let session = TransportSession::connect(
        &receiver.config_with_capacity(TransportPreference::Tcp, 1),
    )
    .await
    .unwrap();
    let (_video, _sensor) = receiver.accept().await;

    // The writer task cannot run between two sends on this runtime, so the
    // second message finds the single slot taken
    assert!(session.send_video(Bytes::from_static(b"first")));
    assert!(!session.send_video(Bytes::from_static(b"second")));

    let stats = session.stats();
    assert_eq!(stats.video.dropped, 1);
    assert_eq!(stats.sensor.dropped, 0);
}

#[tokio::test]
async fn test_dropped_config_is_resent_before_picture() {
    let receiver = Receiver::bind().await;
    let session = TransportSession::connect(
        &receiver.config_with_capacity(TransportPreference::Tcp, 1),
    )
    .await
    .unwrap();
    let (mut video, _sensor) = receiver.accept().await;

    let filler = encode_video_frame(&WireFrameHeader::raw(4, 2, 4).unwrap(), &[0u8; 12]).unwrap();
    assert!(session.send_video(filler));

    let parameter_sets = Bytes::from_static(&[0, 0, 0, 1, 0x67, 0, 0, 0, 1, 0x68]);
    let config = EncodedAccessUnit::config(parameter_sets.clone(), 0);
    assert!(!session.send_access_unit(&config, 640, 480));
    assert!(!session.config_sent());
    assert_eq!(session.stats().video.dropped, 1);

    // Once the queue drains the retained configuration goes out ahead of
    // the next picture
    let (first, _) = timeout(Duration::from_secs(1), read_video_frame(&mut video))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.format, WireFormat::Raw);

    assert!(session.ensure_config(&parameter_sets, 33, 640, 480));
    assert!(session.config_sent());
    let (header, payload) = timeout(Duration::from_secs(1), read_video_frame(&mut video))
        .await
        .unwrap()
        .unwrap();
    assert!(header.keyframe);
    assert_eq!(payload, parameter_sets);

    let picture = EncodedAccessUnit::picture(Bytes::from_static(&[0, 0, 0, 1, 0x41]), false, 33);
    assert!(session.send_access_unit(&picture, 640, 480));
    let (header, payload) = timeout(Duration::from_secs(1), read_video_frame(&mut video))
        .await
        .unwrap()
        .unwrap();
    assert!(!header.keyframe);
    assert_eq!(&payload[..], &[0, 0, 0, 1, 0x41]);

    // Already configured: nothing more is queued
    assert!(session.ensure_config(&parameter_sets, 66, 640, 480));
    assert_eq!(session.stats().gated, 0);
}

#[tokio::test]
async fn test_disconnect_closes_sockets_and_silences_sends() {
    let receiver = Receiver::bind().await;
    let session = TransportSession::connect(&receiver.config(TransportPreference::Auto))
        .await
        .unwrap();
    let (mut video, mut sensor) = receiver.accept().await;

    session.disconnect();
    assert!(!session.is_connected());

    assert_eof(&mut video).await;
    assert_eof(&mut sensor).await;

    // Sends after disconnect return quietly and produce nothing
    assert!(!session.send_video(Bytes::from_static(b"frame")));
    assert!(!session.send_sample(&PoseSample::default()));
    assert_eq!(session.stats().video.sent, 0);
    assert_eq!(session.stats().sensor.sent, 0);

    // Idempotent
    session.disconnect();
}

#[tokio::test]
async fn test_reconnect_allocates_new_sockets() {
    let receiver = Receiver::bind().await;
    let config = receiver.config(TransportPreference::Auto);

    let first = TransportSession::connect(&config).await.unwrap();
    let (mut old_video, _old_sensor) = receiver.accept().await;
    first.disconnect();
    assert_eof(&mut old_video).await;

    let second = TransportSession::connect(&config).await.unwrap();
    let (mut new_video, _new_sensor) = receiver.accept().await;
    assert_ne!(first.id(), second.id());

    // Gate state belongs to the old session
    assert!(!second.config_sent());
    let config_unit = EncodedAccessUnit::config(Bytes::from_static(&[0, 0, 0, 1]), 0);
    assert!(second.send_access_unit(&config_unit, 8, 8));
    let (header, _) = read_video_frame(&mut new_video).await.unwrap();
    assert_eq!(header.width, 8);
}

#[tokio::test]
async fn test_connect_refused() {
    // Grab a free port and release it so nothing listens there
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = StreamConfig {
        host: "127.0.0.1".to_string(),
        video_port: port,
        sensor_port: port + 1,
        transport: TransportPreference::Auto,
        connect_timeout_ms: 1000,
        send_queue_capacity: 8,
    };

    let result = TransportSession::connect(&config).await;
    assert!(matches!(
        result,
        Err(XrLinkError::Transport(TransportError::Connect { .. }))
            | Err(XrLinkError::Transport(TransportError::ConnectTimeout { .. }))
    ));
}

#[tokio::test]
async fn test_udp_datagrams() {
    let video = UdpSocket::bind("0.0.0.0:0").await.unwrap();
    let sensor = UdpSocket::bind("0.0.0.0:0").await.unwrap();

    // Non-loopback destinations are the only way to get UDP. Use the
    // unspecified address, which the OS routes back to this host.
    let config = StreamConfig {
        host: "0.0.0.0".to_string(),
        video_port: video.local_addr().unwrap().port(),
        sensor_port: sensor.local_addr().unwrap().port(),
        transport: TransportPreference::Auto,
        connect_timeout_ms: 1000,
        send_queue_capacity: 8,
    };

    let session = TransportSession::connect(&config).await.unwrap();
    assert_eq!(session.mode(), TransportMode::Udp);

    assert!(session.send_sample(&PoseSample::default()));
    let mut buf = [0u8; 256];
    let len = timeout(Duration::from_secs(1), sensor.recv(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(len, SENSOR_SAMPLE_LEN);

    let config_unit = EncodedAccessUnit::config(Bytes::from_static(&[0, 0, 0, 1, 0x67]), 0);
    assert!(session.send_access_unit(&config_unit, 320, 240));
    let len = timeout(Duration::from_secs(1), video.recv(&mut buf))
        .await
        .unwrap()
        .unwrap();
    let (header, payload) =
        crate::protocol::decode_video_frame(Bytes::copy_from_slice(&buf[..len])).unwrap();
    assert_eq!(header.format, WireFormat::Encoded);
    assert_eq!(payload.len(), 5);
}
