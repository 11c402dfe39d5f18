//! Error types for the runner.
//!
//! [`RunnerError`] is returned by every discovery and execution entry point.
//! Dependency-lister failures never appear here: the lister degrades to "no
//! dependency information" instead.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors returned by [`Runner`](crate::runner::Runner) operations.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Required input was missing or malformed (environment, arguments,
    /// execution plan).
    #[error(transparent)]
    Validation(#[from] tas_core::ValidationError),

    /// The configuration file could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A `--pattern` glob was invalid.
    #[error("invalid test file pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    /// The host framework failed to discover or run tests.
    #[error("host framework failed during {phase}: {message}")]
    Host {
        /// `discover` or `execute`.
        phase: &'static str,
        message: String,
    },

    /// Posting a result document to the reporting endpoint failed.
    #[error("report to {url} failed: {message}")]
    Report { url: String, message: String },

    /// Any other I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RunnerError {
    pub(crate) fn host(phase: &'static str, message: impl Into<String>) -> Self {
        Self::Host {
            phase,
            message: message.into(),
        }
    }
}
