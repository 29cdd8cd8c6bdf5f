//! Event line formatting

use crate::TelemetryError;
use centroid::Mode;
use event_buffer::CentroidEvent;
use std::fmt::Write as _;

/// Renders centroid events as newline-terminated, comma-separated text
#[derive(Debug, Clone, Copy)]
pub struct LineEncoder {
    mode: Mode,
    /// Fixed decimals for coordinates; `None` uses the default float formatting
    decimals: Option<usize>,
}

impl LineEncoder {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            decimals: None,
        }
    }

    pub fn with_decimals(mut self, decimals: Option<usize>) -> Self {
        self.decimals = decimals;
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Replace the contents of `line` with the encoded event
    pub fn encode_into(&self, event: &CentroidEvent, line: &mut String) -> Result<(), TelemetryError> {
        line.clear();

        let corners = match self.mode {
            Mode::ThreeByThree => None,
            Mode::FiveByFive => Some(event.corners.ok_or(TelemetryError::MissingCorners {
                x: event.x,
                y: event.y,
            })?),
        };

        match self.decimals {
            Some(p) => write!(line, "{:.*},{:.*}", p, event.x, p, event.y)?,
            None => write!(line, "{},{}", event.x, event.y)?,
        }
        if let Some(c) = corners {
            write!(line, ",{},{}", c.max, c.min)?;
        }
        line.push('\n');
        Ok(())
    }

    pub fn encode(&self, event: &CentroidEvent) -> Result<String, TelemetryError> {
        let mut line = String::with_capacity(32);
        self.encode_into(event, &mut line)?;
        Ok(line)
    }
}
