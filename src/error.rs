//! Error types for impulse-response analysis
//!
//! Every core operation returns [`Result`]. The taxonomy mirrors the ways an
//! analysis can go wrong:
//!
//! - **InvalidInput**: the signal itself is unusable (empty, silent, wrong
//!   channel count, bad sample rate).
//! - **DegenerateWindow**: two decibel crossings on the energy decay curve
//!   collapse onto the same (or an inverted) sample index, so a slope or a
//!   time window cannot be formed.
//! - **Configuration**: a parameter is out of range or a name is not known.
//!
//! `Io` and `Decode` only come from the file-loading collaborators.

use std::io;
use thiserror::Error;

/// Result type for analysis operations
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Errors that can occur while extracting features from an impulse response
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Empty or silent signal, non-positive sample rate, mismatched channels
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Decay-curve crossings resolved to an empty or inverted sample range
    #[error("degenerate window for {context}: start index {start}, end index {end}")]
    DegenerateWindow {
        start: usize,
        end: usize,
        context: String,
    },

    /// Parameter out of range or unrecognised name
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Reading an input or writing a report failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The audio container or codec could not be decoded
    #[error("decode error: {0}")]
    Decode(String),
}

impl AnalysisError {
    pub(crate) fn invalid<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub(crate) fn config<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub(crate) fn degenerate<S: Into<String>>(start: usize, end: usize, context: S) -> Self {
        Self::DegenerateWindow {
            start,
            end,
            context: context.into(),
        }
    }

    /// Short machine-readable tag used in report flags
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::DegenerateWindow { .. } => "degenerate_window",
            Self::Configuration(_) => "configuration",
            Self::Io(_) => "io",
            Self::Decode(_) => "decode",
        }
    }
}

/// Reject empty signals and unusable sample rates
pub(crate) fn check_signal(signal: &[f64], sample_rate: f64) -> Result<()> {
    if signal.is_empty() {
        return Err(AnalysisError::invalid("signal is empty"));
    }
    if !(sample_rate.is_finite() && sample_rate > 0.0) {
        return Err(AnalysisError::invalid(format!(
            "sample rate must be positive, got {}",
            sample_rate
        )));
    }
    Ok(())
}
