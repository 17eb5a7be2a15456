//! Error types for umag-mesh

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MeshError>;

#[derive(Error, Debug)]
pub enum MeshError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Unsupported mesh format version: {0}")]
    UnsupportedVersion(String),

    #[error("Missing section: {0}")]
    MissingSection(String),

    #[error("Element at line {line} has {found} node indices, expected {expected}")]
    InvalidIndexCount {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("Node index {index} out of range (mesh has {count} nodes)")]
    NodeIndexOutOfRange { index: usize, count: usize },

    #[error("Mesh has no {0}")]
    Empty(&'static str),
}

impl MeshError {
    /// Shorthand for a line-tagged parse failure.
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        MeshError::Parse {
            line,
            message: message.into(),
        }
    }
}
