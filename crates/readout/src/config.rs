//! Readout configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional TOML
//! file, then `READOUT__SECTION__KEY` environment variables.

use centroid::DetectorConfig;
use event_buffer::DEFAULT_CAPACITY;
use frame_capture::{Aperture, CaptureError, FrameGeometry};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use telemetry::{OutputConfig, TelemetryError};
use thiserror::Error;
use tracing::Level;

/// Environment variable prefix; nested keys are separated by `__`
pub const ENV_PREFIX: &str = "READOUT";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error(transparent)]
    Aperture(#[from] CaptureError),

    #[error(transparent)]
    Output(#[from] TelemetryError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// How frames are pulled from the input stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadPolicy {
    /// Seek to the tail and read the newest complete frame
    Latest,
    /// Read every frame in order
    Sequential,
}

/// Frame geometry and read policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameConfig {
    pub width: usize,
    pub height: usize,
    pub read_policy: ReadPolicy,
    /// Poll period while waiting for a new frame (latest policy)
    pub poll_interval_ms: u64,
    /// Give up waiting for a new frame after this long (latest policy)
    pub stale_timeout_ms: u64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        let geometry = FrameGeometry::default();
        Self {
            width: geometry.width,
            height: geometry.height,
            read_policy: ReadPolicy::Latest,
            poll_interval_ms: 5,
            stale_timeout_ms: 1000,
        }
    }
}

impl FrameConfig {
    pub fn geometry(&self) -> FrameGeometry {
        FrameGeometry::new(self.width, self.height)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stale_timeout(&self) -> Duration {
        Duration::from_millis(self.stale_timeout_ms)
    }
}

/// Shared event buffer sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    pub capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Where the centroiding mode comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeSelect {
    #[serde(alias = "3x3")]
    ThreeByThree,
    #[serde(alias = "5x5")]
    FiveByFive,
    /// Read the mode pin once at startup
    Gpio,
}

/// Mode selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeConfig {
    pub select: ModeSelect,
    /// sysfs value file of the mode pin (`1` selects 5x5)
    pub gpio_value_path: PathBuf,
}

impl Default for ModeConfig {
    fn default() -> Self {
        Self {
            select: ModeSelect::FiveByFive,
            gpio_value_path: PathBuf::from("/sys/class/gpio/gpio24/value"),
        }
    }
}

/// Frame input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Raw 8-bit video stream, `/dev/stdin` when piped from the camera tool
    pub path: PathBuf,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/dev/stdin"),
        }
    }
}

/// Prometheus exporter for the pipeline counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Counters are recorded but go nowhere unless the exporter is enabled
    pub enabled: bool,
    /// Scrape endpoint
    pub listen: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: "0.0.0.0:9100".to_string(),
        }
    }
}

impl MetricsConfig {
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen.parse().map_err(|_| {
            ConfigError::Invalid(format!("metrics.listen {:?} is not an address", self.listen))
        })
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Text,
    Json,
}

/// Complete readout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadoutConfig {
    pub frame: FrameConfig,
    pub aperture: Aperture,
    pub detector: DetectorConfig,
    pub buffer: BufferConfig,
    pub mode: ModeConfig,
    pub input: InputConfig,
    pub output: OutputConfig,
    pub metrics: MetricsConfig,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for ReadoutConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            aperture: Aperture::default(),
            detector: DetectorConfig::default(),
            buffer: BufferConfig::default(),
            mode: ModeConfig::default(),
            input: InputConfig::default(),
            output: OutputConfig::default(),
            metrics: MetricsConfig::default(),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

impl ReadoutConfig {
    /// Load defaults, then `path` (if given), then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let loaded = Self::load_unvalidated(path)?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Layer the sources without validating, for callers that apply further
    /// overrides before calling [`ReadoutConfig::validate`]
    pub fn load_unvalidated(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Reject configurations that would fault during scanning
    pub fn validate(&self) -> Result<(), ConfigError> {
        let geometry = self.frame.geometry();
        self.aperture.validate(&geometry)?;

        if self.buffer.capacity == 0 {
            return Err(ConfigError::Invalid("buffer.capacity must be positive".into()));
        }
        self.output.validate()?;
        if self.metrics.enabled {
            self.metrics.listen_addr()?;
        }
        self.log_level()?;
        Ok(())
    }

    pub fn log_level(&self) -> Result<Level, ConfigError> {
        self.log_level
            .parse::<Level>()
            .map_err(|_| ConfigError::Invalid(format!("unknown log_level {:?}", self.log_level)))
    }
}
