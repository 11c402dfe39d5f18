//! Error types for the engine.

use std::path::PathBuf;

use thiserror::Error;

/// Malformed external input: a bad execution plan or missing required
/// configuration. Always fatal to the current command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors loading a blocklist/quarantine policy file.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The file exists but could not be read.
    #[error("could not read policy file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not a JSON object of file → entry lists.
    #[error("invalid policy file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
