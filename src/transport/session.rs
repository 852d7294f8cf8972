use super::mode::{select_mode, TransportMode};
use super::stats::{TransportStats, TransportStatsSnapshot};
use super::writer::SocketWriter;
use crate::config::StreamConfig;
use crate::encoder::{AccessUnitKind, EncodedAccessUnit};
use crate::error::{Result, TransportError};
use crate::protocol::{encode_sensor_sample, encode_video_frame, PoseSample, WireFrameHeader};
use bytes::Bytes;
use parking_lot::Mutex;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream, UdpSocket};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Video and sensor sockets for one streaming run.
///
/// A session is connected once at construction and never reconnected; after
/// `disconnect` every send is a silent no-op. Sends only enqueue onto the
/// socket's writer task.
pub struct TransportSession {
    id: Uuid,
    mode: TransportMode,
    video_addr: SocketAddr,
    sensor_addr: SocketAddr,
    video: Mutex<Option<SocketWriter>>,
    sensor: Mutex<Option<SocketWriter>>,
    config_sent: AtomicBool,
    stats: Arc<TransportStats>,
}

impl TransportSession {
    /// Resolve the destination once and open both channels
    pub async fn connect(config: &StreamConfig) -> Result<Self> {
        let id = Uuid::new_v4();
        let ip = resolve(&config.host, config.video_port).await?;
        let video_addr = SocketAddr::new(ip, config.video_port);
        let sensor_addr = SocketAddr::new(ip, config.sensor_port);
        let mode = select_mode(&video_addr, config.transport);

        debug!(
            "Session {}: {} resolved to {}, using {} ({:?} requested)",
            id, config.host, ip, mode, config.transport
        );

        let stats = Arc::new(TransportStats::default());
        let capacity = config.send_queue_capacity;

        let (video, sensor) = match mode {
            TransportMode::Tcp => {
                let timeout = config.connect_timeout();
                let video_stream = connect_tcp(video_addr, timeout).await?;
                let sensor_stream = connect_tcp(sensor_addr, timeout).await?;
                (
                    SocketWriter::tcp("video", video_stream, capacity, Arc::clone(&stats.video)),
                    SocketWriter::tcp("sensor", sensor_stream, capacity, Arc::clone(&stats.sensor)),
                )
            }
            TransportMode::Udp => {
                let video_socket = bind_udp(video_addr).await?;
                let sensor_socket = bind_udp(sensor_addr).await?;
                (
                    SocketWriter::udp("video", video_socket, capacity, Arc::clone(&stats.video)),
                    SocketWriter::udp("sensor", sensor_socket, capacity, Arc::clone(&stats.sensor)),
                )
            }
        };

        info!(
            "Transport session {} connected to {} (video {}, sensor {}) via {}",
            id,
            ip,
            config.video_port,
            config.sensor_port,
            mode
        );

        Ok(Self {
            id,
            mode,
            video_addr,
            sensor_addr,
            video: Mutex::new(Some(video)),
            sensor: Mutex::new(Some(sensor)),
            config_sent: AtomicBool::new(false),
            stats,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    pub fn video_addr(&self) -> SocketAddr {
        self.video_addr
    }

    pub fn sensor_addr(&self) -> SocketAddr {
        self.sensor_addr
    }

    /// Whether the video socket can still take data
    pub fn is_video_connected(&self) -> bool {
        self.video
            .lock()
            .as_ref()
            .map(SocketWriter::is_open)
            .unwrap_or(false)
    }

    pub fn is_connected(&self) -> bool {
        let sensor_open = self
            .sensor
            .lock()
            .as_ref()
            .map(SocketWriter::is_open)
            .unwrap_or(false);
        self.is_video_connected() && sensor_open
    }

    /// Whether a configuration unit has gone out on this session
    pub fn config_sent(&self) -> bool {
        self.config_sent.load(Ordering::Acquire)
    }

    /// Queue an already framed video message. Dropped silently when the
    /// socket is gone or its queue is full.
    pub fn send_video(&self, bytes: Bytes) -> bool {
        match self.video.lock().as_ref() {
            Some(writer) => writer.try_send(bytes),
            None => {
                trace!("Video socket closed, dropping {} bytes", bytes.len());
                false
            }
        }
    }

    /// Queue a sensor packet, with the same drop policy as video
    pub fn send_sensor(&self, bytes: Bytes) -> bool {
        match self.sensor.lock().as_ref() {
            Some(writer) => writer.try_send(bytes),
            None => {
                trace!("Sensor socket closed, dropping {} bytes", bytes.len());
                false
            }
        }
    }

    pub fn send_sample(&self, sample: &PoseSample) -> bool {
        self.send_sensor(encode_sensor_sample(sample))
    }

    /// Frame and queue one encoder output.
    ///
    /// Picture units are held back until a configuration unit has been
    /// queued on this session.
    pub fn send_access_unit(&self, unit: &EncodedAccessUnit, width: u32, height: u32) -> bool {
        let is_config = match unit.kind {
            AccessUnitKind::EndOfStream => return false,
            AccessUnitKind::Config => true,
            AccessUnitKind::Picture { .. } => {
                if !self.config_sent() {
                    self.stats.record_gated();
                    warn!(
                        "Session {}: dropping access unit at {}us, no configuration sent yet",
                        self.id, unit.pts_us
                    );
                    return false;
                }
                false
            }
        };

        let framed = WireFrameHeader::encoded(width, height, unit.is_keyframe())
            .and_then(|header| encode_video_frame(&header, &unit.data));
        let framed = match framed {
            Ok(framed) => framed,
            Err(e) => {
                warn!("Session {}: cannot frame access unit: {}", self.id, e);
                return false;
            }
        };

        let queued = self.send_video(framed);
        if queued && is_config && !self.config_sent.swap(true, Ordering::AcqRel) {
            info!(
                "Session {}: configuration unit sent ({} bytes)",
                self.id,
                unit.data.len()
            );
        }
        queued
    }

    /// Queue `config` ahead of the next picture unless a configuration unit
    /// already went out on this session. Returns whether the session now
    /// has its configuration on the wire.
    pub fn ensure_config(&self, config: &Bytes, pts_us: u64, width: u32, height: u32) -> bool {
        if self.config_sent() {
            return true;
        }
        debug!(
            "Session {}: resending configuration unit ahead of picture at {}us",
            self.id, pts_us
        );
        self.send_access_unit(&EncodedAccessUnit::config(config.clone(), pts_us), width, height)
    }

    /// Close both sockets. In-flight writes are abandoned, not awaited.
    pub fn disconnect(&self) {
        let video = self.video.lock().take();
        let sensor = self.sensor.lock().take();

        if video.is_none() && sensor.is_none() {
            debug!("Transport session {} already disconnected", self.id);
            return;
        }

        drop(video);
        drop(sensor);
        info!("Transport session {} disconnected", self.id);
    }

    /// Get current transport statistics
    pub fn stats(&self) -> TransportStatsSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}

async fn resolve(host: &str, port: u16) -> Result<IpAddr> {
    let mut addrs = lookup_host((host, port))
        .await
        .map_err(|source| TransportError::Resolve {
            host: host.to_string(),
            source,
        })?;

    addrs
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| {
            TransportError::NoAddress {
                host: host.to_string(),
            }
            .into()
        })
}

async fn connect_tcp(addr: SocketAddr, timeout: Duration) -> Result<TcpStream> {
    let stream = match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => return Err(TransportError::Connect { addr, source }.into()),
        Err(_) => return Err(TransportError::ConnectTimeout { addr, timeout }.into()),
    };

    if let Err(e) = stream.set_nodelay(true) {
        debug!("Could not disable Nagle on {}: {}", addr, e);
    }
    Ok(stream)
}

async fn bind_udp(addr: SocketAddr) -> Result<UdpSocket> {
    let local = match addr.ip() {
        IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    };

    let socket = UdpSocket::bind(local).await.map_err(TransportError::Bind)?;
    socket
        .connect(addr)
        .await
        .map_err(|source| TransportError::Connect { addr, source })?;
    Ok(socket)
}
