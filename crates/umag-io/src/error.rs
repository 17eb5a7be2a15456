//! Error type for settings and solution-file handling.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IoError>;

#[derive(Error, Debug)]
pub enum IoError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings error: {0}")]
    Json(#[from] serde_json::Error),

    /// Shape or content mismatch in a solution file (restart).
    #[error("format error at line {line}: {message}")]
    Format { line: usize, message: String },

    /// Settings parsed but carry values the solver cannot run with.
    #[error("invalid settings: {0}")]
    Settings(String),
}

impl IoError {
    pub fn format(line: usize, message: impl Into<String>) -> Self {
        IoError::Format {
            line,
            message: message.into(),
        }
    }
}
