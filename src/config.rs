//! Runner configuration.
//!
//! Two layers feed a run:
//!
//! - [`RunnerConfig`]: repository settings in `.tas/config.toml` (host command,
//!   report timeout, dependency lister, policy file).
//! - [`RunContext`]: per-build values the CI pipeline passes through the
//!   environment (`REPO_ID`, `BUILD_ID`, endpoints, ...).
//!
//! Where both name the same thing (policy file, dependency-lister binary), the
//! environment wins.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;
use serde::Deserialize;
use thiserror::Error;
use tas_core::{BuildInfo, ValidationError};

/// Config file location relative to the repository root.
pub const DEFAULT_CONFIG_PATH: &str = ".tas/config.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Repository-level runner configuration.
///
/// Parsed from `.tas/config.toml`. Missing fields use defaults; a missing
/// file means all defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunnerConfig {
    /// How to reach the host test framework.
    #[serde(default)]
    pub host: HostConfig,

    /// Reporting endpoint settings.
    #[serde(default)]
    pub report: ReportConfig,

    /// Dependency-lister settings.
    #[serde(default)]
    pub deps: DepsConfig,

    /// Blocklist/quarantine policy.
    #[serde(default)]
    pub policy: PolicyConfig,
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Host framework settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostConfig {
    /// Shell command that speaks the host protocol (see [`crate::host`]).
    pub command: Option<String>,
}

/// Reporting endpoint settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportConfig {
    /// Request timeout in seconds (default: 30).
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl ReportConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

const fn default_timeout_seconds() -> u64 {
    30
}

/// Dependency-lister settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DepsConfig {
    /// Lister executable; `SMART_BINARY` overrides it.
    pub binary: Option<String>,
    /// Directory for the request/response files (default: `<repo>/__tas`).
    pub work_dir: Option<PathBuf>,
}

/// Policy settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    /// Policy JSON file; `BLOCKLISTED_TESTS_FILE` overrides it.
    pub file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Error loading a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("could not read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML is malformed or names an unknown field.
    #[error("{}: {message}", location(path.as_deref(), *line))]
    Invalid {
        /// Unset when parsing a string rather than a file.
        path: Option<PathBuf>,
        /// 1-based line of the offending value, when TOML reports a span.
        line: Option<usize>,
        message: String,
    },
}

impl ConfigError {
    /// The file the error refers to, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Read { path, .. } => Some(path),
            Self::Invalid { path, .. } => path.as_deref(),
        }
    }

    /// The offending line of an invalid file.
    #[must_use]
    pub const fn line(&self) -> Option<usize> {
        match self {
            Self::Read { .. } => None,
            Self::Invalid { line, .. } => *line,
        }
    }

    fn in_file(self, file: &Path) -> Self {
        match self {
            Self::Invalid { line, message, .. } => Self::Invalid {
                path: Some(file.to_owned()),
                line,
                message,
            },
            read @ Self::Read { .. } => read,
        }
    }
}

fn location(path: Option<&Path>, line: Option<usize>) -> String {
    let origin = path.map_or_else(|| "config".to_owned(), |p| p.display().to_string());
    match line {
        Some(line) => format!("{origin} line {line}"),
        None => origin,
    }
}

impl RunnerConfig {
    /// Load configuration from a TOML file. A missing file yields defaults.
    ///
    /// # Errors
    /// [`ConfigError::Read`] for unreadable files, [`ConfigError::Invalid`]
    /// for bad contents.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents).map_err(|e| e.in_file(path)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file; using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_owned(),
                source,
            }),
        }
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// [`ConfigError::Invalid`] on invalid TOML or unknown fields.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Invalid {
            path: None,
            line: e
                .span()
                .map(|span| text[..span.start].matches('\n').count() + 1),
            message: e.message().to_owned(),
        })
    }
}

// ---------------------------------------------------------------------------
// RunContext
// ---------------------------------------------------------------------------

/// Per-build values supplied by the CI pipeline.
#[derive(Args, Clone, Debug, Default, PartialEq, Eq)]
pub struct RunContext {
    /// Repository root; test paths and policy keys are relative to it
    #[arg(long, env = "TAS_REPO_ROOT", default_value = ".")]
    pub repo_root: PathBuf,

    #[arg(long, env = "REPO_ID", hide_env_values = true)]
    pub repo_id: Option<String>,

    #[arg(long, env = "ORG_ID", hide_env_values = true)]
    pub org_id: Option<String>,

    #[arg(long, env = "COMMIT_ID")]
    pub commit_id: Option<String>,

    #[arg(long, env = "BUILD_ID")]
    pub build_id: Option<String>,

    #[arg(long, env = "TASK_ID")]
    pub task_id: Option<String>,

    #[arg(long = "branch", env = "BRANCH_NAME")]
    pub branch_name: Option<String>,

    #[arg(long, env = "SHUFFLE_TEST")]
    pub shuffle_test: Option<String>,

    /// Endpoint receiving the discovery result
    #[arg(long, env = "ENDPOINT_POST_TEST_LIST")]
    pub post_test_list: Option<String>,

    /// Endpoint receiving execution results
    #[arg(long, env = "ENDPOINT_POST_TEST_RESULTS")]
    pub post_test_results: Option<String>,

    /// Blocklist/quarantine policy file
    #[arg(long, env = "BLOCKLISTED_TESTS_FILE")]
    pub policy_file: Option<PathBuf>,

    /// Dependency-lister executable
    #[arg(long, env = "SMART_BINARY")]
    pub smart_binary: Option<String>,
}

impl RunContext {
    /// Fill the policy file and lister binary from `config` where the
    /// environment left them unset.
    #[must_use]
    pub fn with_config(mut self, config: &RunnerConfig) -> Self {
        if self.policy_file.is_none() {
            self.policy_file.clone_from(&config.policy.file);
        }
        if self.smart_binary.is_none() {
            self.smart_binary.clone_from(&config.deps.binary);
        }
        self
    }

    /// Policy file resolved against the repository root.
    #[must_use]
    pub fn policy_path(&self) -> Option<PathBuf> {
        self.policy_file.as_ref().map(|p| self.repo_root.join(p))
    }

    /// Identifiers stamped onto every result document. Unset values are
    /// empty strings.
    #[must_use]
    pub fn build_info(&self) -> BuildInfo {
        let get = |v: &Option<String>| v.clone().unwrap_or_default();
        BuildInfo {
            repo_id: get(&self.repo_id),
            commit_id: get(&self.commit_id),
            build_id: get(&self.build_id),
            task_id: get(&self.task_id),
            org_id: get(&self.org_id),
            branch: get(&self.branch_name),
        }
    }

    /// Endpoint for the discovery result, if reporting is enabled.
    #[must_use]
    pub fn test_list_endpoint(&self) -> Option<&str> {
        self.post_test_list.as_deref().filter(|s| !s.is_empty())
    }

    /// Endpoint for execution results, if reporting is enabled.
    #[must_use]
    pub fn test_results_endpoint(&self) -> Option<&str> {
        self.post_test_results.as_deref().filter(|s| !s.is_empty())
    }

    /// Check that everything discovery needs is present.
    ///
    /// # Errors
    /// Names the first missing argument or environment variable.
    pub fn validate_discovery(&self, patterns: &[String]) -> Result<(), ValidationError> {
        require_pattern(patterns)?;
        require("REPO_ID", self.repo_id.as_ref())?;
        require("ORG_ID", self.org_id.as_ref())?;
        require("COMMIT_ID", self.commit_id.as_ref())?;
        require("BUILD_ID", self.build_id.as_ref())?;
        require("BRANCH_NAME", self.branch_name.as_ref())
    }

    /// Check that everything execution needs is present.
    ///
    /// # Errors
    /// Names the first missing argument or environment variable.
    pub fn validate_execution(&self, patterns: &[String]) -> Result<(), ValidationError> {
        require_pattern(patterns)?;
        require("REPO_ID", self.repo_id.as_ref())?;
        require("COMMIT_ID", self.commit_id.as_ref())?;
        require("TASK_ID", self.task_id.as_ref())?;
        require("BUILD_ID", self.build_id.as_ref())?;
        require("SHUFFLE_TEST", self.shuffle_test.as_ref())
    }
}

fn require_pattern(patterns: &[String]) -> Result<(), ValidationError> {
    if patterns.is_empty() {
        return Err(ValidationError::new("missing '--pattern' argument"));
    }
    Ok(())
}

fn require(name: &str, value: Option<&String>) -> Result<(), ValidationError> {
    if value.is_none() {
        return Err(ValidationError::new(format!(
            "'{name}' is not set in environment variables"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
