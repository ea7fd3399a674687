//! Error taxonomy for the console core and its collaborators

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by collaborators (surface provider, board, input source).
///
/// Only [`UiError::Integrity`] is fatal; every other variant is absorbed by the
/// component that sees it and logged.
#[derive(Debug, Error)]
pub enum UiError {
    /// A named surface or bitmap could not be loaded.
    #[error("missing surface '{name}'")]
    ResourceMissing { name: String },

    /// A sensor or control pseudo-file could not be opened or read.
    #[error("sensor {} unavailable: {source}", path.display())]
    SensorUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A sensor file was readable but did not hold an ASCII integer.
    #[error("sensor {} holds unexpected value '{value}'", path.display())]
    InvalidSensorValue { path: PathBuf, value: String },

    /// The board environment failed its integrity check at startup.
    #[error("integrity check failed: {0}")]
    Integrity(String),

    /// The input device went away or returned garbage.
    #[error("input error: {0}")]
    Input(String),

    /// A board action (reboot, power off, boot hand-off) did not happen.
    #[error("{action} failed: {detail}")]
    Action { action: &'static str, detail: String },
}

impl UiError {
    pub fn missing(name: impl Into<String>) -> Self {
        UiError::ResourceMissing { name: name.into() }
    }

    pub fn action(action: &'static str, detail: impl ToString) -> Self {
        UiError::Action { action, detail: detail.to_string() }
    }
}
