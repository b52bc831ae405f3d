//! Error types used across the recorder.

use std::path::PathBuf;

use chrono::{DateTime, FixedOffset};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Invalid time '{value}', expected format dd/mm/yyyy hh:mm:ss ±zzzz: {source}")]
    InvalidTimestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("End time must be after start time (start: {start}, end: {end})")]
    InvalidWindow {
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    },

    #[error("Failed to create output directory '{}': {source}", path.display())]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to launch capture program '{}': {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RecorderError {
    /// True for errors caused by the recording window configuration.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            RecorderError::InvalidTimestamp { .. } | RecorderError::InvalidWindow { .. }
        )
    }
}

pub type RecorderResult<T> = Result<T, RecorderError>;
