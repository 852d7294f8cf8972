use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::sync::Arc;
use tracing::{error, info};
use xrlink::encoder::EncoderFactory;
use xrlink::{
    EventBus, StaticPoseSource, StreamController, SyntheticCamera, SyntheticImu,
    TransportPreference, XrLinkConfig,
};

#[derive(Parser, Debug)]
#[command(name = "xrlink")]
#[command(about = "Stream camera frames and head pose samples to a headset receiver")]
#[command(version)]
#[command(long_about = "Captures camera frames, optionally encodes them to H.264, and streams \
them together with head pose and IMU samples to a receiver over a video and a sensor socket. \
Loopback receivers always get TCP; remote ones get UDP unless TCP is requested.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "xrlink.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Receiver host, overriding the configuration
    #[arg(long, value_name = "HOST", help = "Receiver host name or address")]
    host: Option<String>,

    /// Transport preference, overriding the configuration
    #[arg(long, value_enum, value_name = "MODE", help = "Transport: auto, udp, or tcp (loopback always uses tcp)")]
    transport: Option<TransportArg>,

    /// Video port, overriding the configuration
    #[arg(long, value_name = "PORT", help = "Receiver port for the video socket")]
    video_port: Option<u16>,

    /// Sensor port, overriding the configuration
    #[arg(long, value_name = "PORT", help = "Receiver port for the sensor socket")]
    sensor_port: Option<u16>,

    /// Encode video even over TCP
    #[arg(long, help = "Send encoded video over TCP instead of raw frames")]
    force_encode: bool,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without streaming")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TransportArg {
    Auto,
    Udp,
    Tcp,
}

impl From<TransportArg> for TransportPreference {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Auto => TransportPreference::Auto,
            TransportArg::Udp => TransportPreference::Udp,
            TransportArg::Tcp => TransportPreference::Tcp,
        }
    }
}

/// Apply command line overrides on top of the loaded configuration
fn apply_overrides(args: &Args, config: &mut XrLinkConfig) {
    if let Some(host) = args.host.clone() {
        config.stream.host = host;
    }
    if let Some(transport) = args.transport {
        config.stream.transport = transport.into();
    }
    if let Some(port) = args.video_port {
        config.stream.video_port = port;
    }
    if let Some(port) = args.sensor_port {
        config.stream.sensor_port = port;
    }
    if args.force_encode {
        config.encoder.force_encode = true;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        println!("# xrlink configuration file");
        println!("# Every option with its default value");
        println!();
        println!("{}", XrLinkConfig::default_toml()?);
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting xrlink v{}", env!("CARGO_PKG_VERSION"));

    info!("Configuration file: {}", args.config);
    let mut config = XrLinkConfig::load_from_file(&args.config).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    apply_overrides(&args, &mut config);

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        std::process::exit(1);
    }
    if args.validate_config {
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let capture = Arc::new(SyntheticCamera::new(&config.camera)?);
    let sensors = Arc::new(SyntheticImu::new(config.sensors.rate_hz));
    let pose_source = Arc::new(StaticPoseSource::identity());
    let encoder_factory = encoder_factory();

    let controller = StreamController::new(
        config,
        capture,
        sensors,
        pose_source,
        encoder_factory,
        EventBus::default(),
    );

    let exit_code = controller.run().await.map_err(|e| {
        error!("Streaming failed: {}", e);
        e
    })?;

    info!("xrlink exited with code: {}", exit_code);
    std::process::exit(exit_code);
}

#[cfg(all(feature = "gstreamer", target_os = "linux"))]
fn encoder_factory() -> Arc<dyn EncoderFactory> {
    Arc::new(xrlink::encoder::GstEncoderFactory)
}

#[cfg(not(all(feature = "gstreamer", target_os = "linux")))]
fn encoder_factory() -> Arc<dyn EncoderFactory> {
    use std::time::Duration;
    use xrlink::encoder::mock::{MockEncoderFactory, MockEncoderHandle, MockOptions};

    tracing::warn!("Built without the gstreamer feature, encoded video uses the mock encoder");
    let options = MockOptions {
        auto_drive: Some(Duration::from_millis(33)),
        ..MockOptions::default()
    };
    Arc::new(MockEncoderFactory::new(MockEncoderHandle::new(options)))
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("xrlink={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_overrides() {
        let args = Args::try_parse_from([
            "xrlink",
            "--host",
            "192.168.1.40",
            "--transport",
            "tcp",
            "--video-port",
            "6000",
            "--sensor-port",
            "6001",
            "--force-encode",
        ])
        .unwrap();

        let mut config = XrLinkConfig::default();
        apply_overrides(&args, &mut config);

        assert_eq!(config.stream.host, "192.168.1.40");
        assert_eq!(config.stream.transport, TransportPreference::Tcp);
        assert_eq!(config.stream.video_port, 6000);
        assert_eq!(config.stream.sensor_port, 6001);
        assert!(config.encoder.force_encode);
    }

    #[test]
    fn test_no_overrides_keep_configuration() {
        let args = Args::try_parse_from(["xrlink"]).unwrap();
        let mut config = XrLinkConfig::default();
        config.stream.transport = TransportPreference::Udp;
        apply_overrides(&args, &mut config);

        assert_eq!(config.stream.transport, TransportPreference::Udp);
        assert_eq!(config.stream.video_port, XrLinkConfig::default().stream.video_port);
        assert!(!config.encoder.force_encode);
    }

    #[test]
    fn test_unknown_transport_is_rejected() {
        assert!(Args::try_parse_from(["xrlink", "--transport", "quic"]).is_err());
    }
}
