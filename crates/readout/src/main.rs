//! Photon Readout - Main Entry Point
//!
//! Pipeline counters are exported over Prometheus when `metrics.enabled` is
//! set; otherwise they are recorded without a recorder and dropped.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use readout::{
    init_logging, init_metrics, open_source, resolve_mode, ModeSelect, Pipeline, ReadoutConfig,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use telemetry::OutputKind;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliMode {
    #[value(name = "3x3")]
    ThreeByThree,
    #[value(name = "5x5")]
    FiveByFive,
    Gpio,
}

impl From<CliMode> for ModeSelect {
    fn from(mode: CliMode) -> Self {
        match mode {
            CliMode::ThreeByThree => ModeSelect::ThreeByThree,
            CliMode::FiveByFive => ModeSelect::FiveByFive,
            CliMode::Gpio => ModeSelect::Gpio,
        }
    }
}

/// Detect photon events in a raw video stream and send their centroids
/// over a serial link
#[derive(Debug, Parser)]
#[command(name = "readout", version, about)]
struct Cli {
    /// TOML configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Centroiding mode; overrides `mode.select`
    #[arg(long, value_enum)]
    mode: Option<CliMode>,

    /// Raw frame input; overrides `input.path`
    #[arg(long, short)]
    input: Option<PathBuf>,

    /// Write telemetry lines to stdout instead of the configured output
    #[arg(long)]
    stdout: bool,

    /// Serial device; overrides `output.device`
    #[arg(long)]
    device: Option<String>,

    /// Log level; overrides `log_level`
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn apply(&self, config: &mut ReadoutConfig) {
        if let Some(mode) = self.mode {
            config.mode.select = mode.into();
        }
        if let Some(input) = &self.input {
            config.input.path = input.clone();
        }
        if self.stdout {
            config.output.kind = OutputKind::Stdout;
        }
        if let Some(device) = &self.device {
            config.output.device = device.clone();
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = ReadoutConfig::load_unvalidated(cli.config.as_deref())
        .context("Failed to load configuration")?;
    cli.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    init_logging(&config)?;
    init_metrics(&config.metrics)?;

    info!("=== Photon Readout v{} ===", env!("CARGO_PKG_VERSION"));

    let mode = resolve_mode(&config.mode)?;
    info!("Centroiding mode: {}", mode);

    let pipeline = Pipeline::new(&config, mode)?;
    let mut source = open_source(&config).context("Failed to open frame input")?;
    let output = telemetry::open_output(&config.output).context("Failed to open telemetry output")?;

    let stop = Arc::new(AtomicBool::new(false));
    let mut worker = {
        let stop = Arc::clone(&stop);
        tokio::task::spawn_blocking(move || pipeline.run(&mut source, output, &stop))
    };

    let summary = tokio::select! {
        joined = &mut worker => joined??,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, shutting down");
            stop.store(true, Ordering::Relaxed);
            worker.await??
        }
    };

    if let Some(e) = &summary.transmit_error {
        warn!("Telemetry output failed during the run: {}", e);
    }
    info!(
        "Done: {} frames, {} events, {} dropped, {} lines sent",
        summary.frames, summary.events_emitted, summary.events_dropped, summary.lines_written
    );

    Ok(())
}
