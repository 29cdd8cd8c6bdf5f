//! Centroiding mode resolution

use crate::config::{ModeConfig, ModeSelect};
use crate::ReadoutError;
use centroid::Mode;
use std::fs;
use std::path::Path;
use tracing::info;

/// Resolve the centroiding mode once at startup
pub fn resolve_mode(config: &ModeConfig) -> Result<Mode, ReadoutError> {
    let mode = match config.select {
        ModeSelect::ThreeByThree => Mode::ThreeByThree,
        ModeSelect::FiveByFive => Mode::FiveByFive,
        ModeSelect::Gpio => {
            let high = read_signal(&config.gpio_value_path)?;
            info!(
                "Mode pin {} reads {}",
                config.gpio_value_path.display(),
                if high { "high" } else { "low" }
            );
            Mode::from_signal(high)
        }
    };
    Ok(mode)
}

/// Read a sysfs GPIO value file (`0` or `1`)
fn read_signal(path: &Path) -> Result<bool, ReadoutError> {
    let raw = fs::read_to_string(path).map_err(|e| {
        ReadoutError::ModeSignal(format!("cannot read {}: {}", path.display(), e))
    })?;
    match raw.trim() {
        "1" => Ok(true),
        "0" => Ok(false),
        other => Err(ReadoutError::ModeSignal(format!(
            "unexpected value {:?} in {}",
            other,
            path.display()
        ))),
    }
}
