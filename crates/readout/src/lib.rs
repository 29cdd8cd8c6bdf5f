//! Photon Readout
//!
//! Wires frame capture, event detection, the shared event buffer and the
//! telemetry transmitter into one acquisition pipeline.

pub mod config;
pub mod mode;
pub mod pipeline;

pub use config::{
    ConfigError, LogFormat, MetricsConfig, ModeSelect, ReadPolicy, ReadoutConfig, ENV_PREFIX,
};
pub use mode::resolve_mode;
pub use pipeline::{Pipeline, RunSummary, StopReason};

use centroid::DetectError;
use frame_capture::{CaptureError, FrameSource, LatestFrameSource, SequentialSource};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::fs::File;
use telemetry::TelemetryError;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::FmtSubscriber;

/// Readout error types
#[derive(Error, Debug)]
pub enum ReadoutError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Detect(#[from] DetectError),

    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    #[error("Mode signal error: {0}")]
    ModeSignal(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Metrics exporter failed: {0}")]
    Metrics(String),

    #[error("Transmitter thread panicked")]
    TransmitterPanicked,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Initialize logging; logs go to stderr so stdout stays free for telemetry
pub fn init_logging(config: &ReadoutConfig) -> Result<(), ReadoutError> {
    let level = config.log_level()?;
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);

    let result = match config.log_format {
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish()),
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
    };
    result.map_err(|e| ReadoutError::Logging(e.to_string()))
}

/// Install the Prometheus exporter when enabled; must run inside a Tokio runtime
pub fn init_metrics(config: &MetricsConfig) -> Result<(), ReadoutError> {
    if !config.enabled {
        info!("Metrics exporter disabled, counters are not exported");
        return Ok(());
    }
    let addr = config.listen_addr()?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| ReadoutError::Metrics(e.to_string()))?;
    info!("Serving metrics on http://{}/metrics", addr);
    Ok(())
}

/// Open the configured input with the configured read policy
pub fn open_source(config: &ReadoutConfig) -> Result<Box<dyn FrameSource + Send>, ReadoutError> {
    let geometry = config.frame.geometry();
    let file = File::open(&config.input.path)?;
    info!(
        "Reading {}x{} frames from {} ({:?})",
        geometry.width,
        geometry.height,
        config.input.path.display(),
        config.frame.read_policy
    );

    let source: Box<dyn FrameSource + Send> = match config.frame.read_policy {
        ReadPolicy::Latest => Box::new(
            LatestFrameSource::new(file, geometry)
                .with_stale_timeout(config.frame.poll_interval(), config.frame.stale_timeout()),
        ),
        ReadPolicy::Sequential => Box::new(SequentialSource::new(file, geometry)),
    };
    Ok(source)
}
