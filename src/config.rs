use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::transport::TransportPreference;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct XrLinkConfig {
    pub stream: StreamConfig,
    pub encoder: EncoderConfig,
    pub camera: CameraConfig,
    pub sensors: SensorConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StreamConfig {
    /// Receiver host name or address
    #[serde(default = "default_stream_host")]
    pub host: String,

    /// Port for the video channel
    #[serde(default = "default_video_port")]
    pub video_port: u16,

    /// Port for the pose/IMU channel
    #[serde(default = "default_sensor_port")]
    pub sensor_port: u16,

    /// UDP-vs-TCP override; loopback destinations always use TCP
    #[serde(default)]
    pub transport: TransportPreference,

    /// Upper bound for each TCP connect attempt
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Pending sends queued per socket before new data is dropped
    #[serde(default = "default_send_queue_capacity")]
    pub send_queue_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EncoderMode {
    /// Caller feeds one frame and drains ready output per capture
    #[default]
    Sync,
    /// Encoder pulls frames from the frame slot through callbacks
    Async,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EncoderConfig {
    /// Route frames through the video encoder instead of raw passthrough
    #[serde(default = "default_force_encode")]
    pub force_encode: bool,

    /// Target bitrate in bits per second
    #[serde(default = "default_bitrate")]
    pub bitrate: u32,

    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,

    #[serde(default = "default_i_frame_interval")]
    pub i_frame_interval_secs: u32,

    #[serde(default = "default_mime")]
    pub mime: String,

    #[serde(default)]
    pub mode: EncoderMode,

    /// How long pull mode waits for a free input buffer
    #[serde(default = "default_input_timeout_ms")]
    pub input_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Camera index to open
    #[serde(default = "default_camera_index")]
    pub index: u32,

    /// Desired capture resolution (width, height)
    #[serde(default = "default_preferred_resolution")]
    pub preferred_resolution: (u32, u32),

    /// Frames per second
    #[serde(default = "default_camera_fps")]
    pub fps: u32,

    /// Resolutions the capture source offers
    #[serde(default = "default_supported_resolutions")]
    pub supported_resolutions: Vec<(u32, u32)>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SensorConfig {
    /// IMU sampling rate
    #[serde(default = "default_sensor_rate")]
    pub rate_hz: u32,
}

impl StreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl EncoderConfig {
    pub fn input_timeout(&self) -> Duration {
        Duration::from_millis(self.input_timeout_ms)
    }
}

impl XrLinkConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("xrlink.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let resolutions: Vec<Vec<u32>> = default_supported_resolutions()
            .into_iter()
            .map(|(w, h)| vec![w, h])
            .collect();

        let settings = Config::builder()
            .set_default("stream.host", default_stream_host())?
            .set_default("stream.video_port", default_video_port() as u32)?
            .set_default("stream.sensor_port", default_sensor_port() as u32)?
            .set_default("stream.transport", "auto")?
            .set_default("stream.connect_timeout_ms", default_connect_timeout_ms())?
            .set_default(
                "stream.send_queue_capacity",
                default_send_queue_capacity() as u64,
            )?
            .set_default("encoder.force_encode", default_force_encode())?
            .set_default("encoder.bitrate", default_bitrate())?
            .set_default("encoder.frame_rate", default_frame_rate())?
            .set_default("encoder.i_frame_interval_secs", default_i_frame_interval())?
            .set_default("encoder.mime", default_mime())?
            .set_default("encoder.mode", "sync")?
            .set_default("encoder.input_timeout_ms", default_input_timeout_ms())?
            .set_default("camera.index", default_camera_index())?
            .set_default(
                "camera.preferred_resolution",
                vec![
                    default_preferred_resolution().0,
                    default_preferred_resolution().1,
                ],
            )?
            .set_default("camera.fps", default_camera_fps())?
            .set_default("camera.supported_resolutions", resolutions)?
            .set_default("sensors.rate_hz", default_sensor_rate())?
            .add_source(File::with_name(&path_str).required(false))
            // XRLINK_STREAM__VIDEO_PORT=6000 overrides stream.video_port
            .add_source(
                Environment::with_prefix("XRLINK")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: XrLinkConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stream.host.trim().is_empty() {
            return Err(ConfigError::Message(
                "Stream host must not be empty".to_string(),
            ));
        }

        if self.stream.video_port == 0 || self.stream.sensor_port == 0 {
            return Err(ConfigError::Message(
                "Stream ports must be greater than 0".to_string(),
            ));
        }

        if self.stream.video_port == self.stream.sensor_port {
            return Err(ConfigError::Message(
                "Video and sensor ports must differ".to_string(),
            ));
        }

        if self.stream.connect_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Connect timeout must be greater than 0".to_string(),
            ));
        }

        if self.stream.send_queue_capacity == 0 {
            return Err(ConfigError::Message(
                "Send queue capacity must be greater than 0".to_string(),
            ));
        }

        if self.encoder.bitrate == 0 || self.encoder.frame_rate == 0 {
            return Err(ConfigError::Message(
                "Encoder bitrate and frame rate must be greater than 0".to_string(),
            ));
        }

        let (width, height) = self.camera.preferred_resolution;
        if width == 0 || height == 0 {
            return Err(ConfigError::Message(
                "Camera resolution must be greater than 0".to_string(),
            ));
        }

        if width > u16::MAX as u32 || height > u16::MAX as u32 {
            return Err(ConfigError::Message(
                "Camera resolution must fit the 16-bit frame header".to_string(),
            ));
        }

        if self.camera.fps == 0 {
            return Err(ConfigError::Message(
                "Camera fps must be greater than 0".to_string(),
            ));
        }

        if self.sensors.rate_hz == 0 {
            return Err(ConfigError::Message(
                "Sensor rate must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Default configuration rendered as TOML
    pub fn default_toml() -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(&Self::default())
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            force_encode: default_force_encode(),
            bitrate: default_bitrate(),
            frame_rate: default_frame_rate(),
            i_frame_interval_secs: default_i_frame_interval(),
            mime: default_mime(),
            mode: EncoderMode::default(),
            input_timeout_ms: default_input_timeout_ms(),
        }
    }
}

impl Default for XrLinkConfig {
    fn default() -> Self {
        Self {
            stream: StreamConfig {
                host: default_stream_host(),
                video_port: default_video_port(),
                sensor_port: default_sensor_port(),
                transport: TransportPreference::default(),
                connect_timeout_ms: default_connect_timeout_ms(),
                send_queue_capacity: default_send_queue_capacity(),
            },
            encoder: EncoderConfig::default(),
            camera: CameraConfig {
                index: default_camera_index(),
                preferred_resolution: default_preferred_resolution(),
                fps: default_camera_fps(),
                supported_resolutions: default_supported_resolutions(),
            },
            sensors: SensorConfig {
                rate_hz: default_sensor_rate(),
            },
        }
    }
}

// Default value functions
fn default_stream_host() -> String {
    "localhost".to_string()
}
fn default_video_port() -> u16 {
    50000
}
fn default_sensor_port() -> u16 {
    50001
}
fn default_connect_timeout_ms() -> u64 {
    5000
}
fn default_send_queue_capacity() -> usize {
    8
}

fn default_force_encode() -> bool {
    false
}
fn default_bitrate() -> u32 {
    8_000_000
}
fn default_frame_rate() -> u32 {
    30
}
fn default_i_frame_interval() -> u32 {
    5
}
fn default_mime() -> String {
    "video/avc".to_string()
}
fn default_input_timeout_ms() -> u64 {
    50
}

fn default_camera_index() -> u32 {
    1
}
fn default_preferred_resolution() -> (u32, u32) {
    (1280, 960)
}
fn default_camera_fps() -> u32 {
    30
}
fn default_supported_resolutions() -> Vec<(u32, u32)> {
    vec![(640, 480), (1280, 720), (1280, 960), (1920, 1080)]
}

fn default_sensor_rate() -> u32 {
    50
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = XrLinkConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.stream.video_port, 50000);
        assert_eq!(config.stream.sensor_port, 50001);
        assert_eq!(config.stream.transport, TransportPreference::Auto);
        assert!(!config.encoder.force_encode);
        assert_eq!(config.encoder.mode, EncoderMode::Sync);
    }

    #[test]
    fn test_encoder_section_defaults() {
        let encoder = EncoderConfig::default();

        assert_eq!(encoder.bitrate, 8_000_000);
        assert_eq!(encoder.frame_rate, 30);
        assert_eq!(encoder.i_frame_interval_secs, 5);
        assert_eq!(encoder.mime, "video/avc");
        assert_eq!(encoder.input_timeout(), Duration::from_millis(50));
        assert_eq!(XrLinkConfig::default().encoder.bitrate, encoder.bitrate);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[stream]
host = "192.168.1.20"
video_port = 6000
sensor_port = 6001
transport = "tcp"

[encoder]
force_encode = true
mode = "async"

[camera]
preferred_resolution = [640, 480]
"#
        )
        .unwrap();

        let config = XrLinkConfig::load_from_file(file.path()).unwrap();

        assert_eq!(config.stream.host, "192.168.1.20");
        assert_eq!(config.stream.video_port, 6000);
        assert_eq!(config.stream.transport, TransportPreference::Tcp);
        assert!(config.encoder.force_encode);
        assert_eq!(config.encoder.mode, EncoderMode::Async);
        assert_eq!(config.camera.preferred_resolution, (640, 480));
        // Untouched sections keep their defaults
        assert_eq!(config.encoder.bitrate, 8_000_000);
        assert_eq!(config.sensors.rate_hz, 50);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = XrLinkConfig::load_from_file("/nonexistent/xrlink-test.toml").unwrap();
        assert_eq!(config.stream.host, "localhost");
        assert_eq!(config.camera.supported_resolutions.len(), 4);
    }

    #[test]
    fn test_environment_variable_override() {
        env::set_var("XRLINK_ENCODER__INPUT_TIMEOUT_MS", "75");

        let config = XrLinkConfig::load_from_file("/nonexistent/xrlink-env.toml").unwrap();
        assert_eq!(config.encoder.input_timeout_ms, 75);
        assert_eq!(config.encoder.input_timeout(), Duration::from_millis(75));

        env::remove_var("XRLINK_ENCODER__INPUT_TIMEOUT_MS");
    }

    #[test]
    fn test_config_validation() {
        let mut config = XrLinkConfig::default();

        config.stream.sensor_port = config.stream.video_port;
        assert!(config.validate().is_err());
        config.stream.sensor_port = 50001;

        config.camera.preferred_resolution = (0, 480);
        assert!(config.validate().is_err());

        config.camera.preferred_resolution = (70000, 480);
        assert!(config.validate().is_err());

        config.camera.preferred_resolution = (640, 480);
        config.stream.send_queue_capacity = 0;
        assert!(config.validate().is_err());

        config.stream.send_queue_capacity = 4;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_toml_round_trip() {
        let rendered = XrLinkConfig::default_toml().unwrap();
        let parsed: XrLinkConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.stream.host, "localhost");
        assert_eq!(parsed.encoder.mime, "video/avc");
    }
}
