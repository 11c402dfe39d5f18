//! Telemetry initialization.
//!
//! Logs always go to stderr so stdout stays reserved for the JSON result
//! document. Controlled by:
//! - `RUST_LOG`: standard `EnvFilter` directives (default `info`);
//! - `TAS_LOG_FORMAT`: `json` for JSON events with span close timings,
//!   anything else (or unset) for human-readable lines.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

/// Output format for log events.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    /// Read the format from `TAS_LOG_FORMAT`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_label(std::env::var("TAS_LOG_FORMAT").ok().as_deref())
    }

    fn from_label(label: Option<&str>) -> Self {
        match label.map(str::trim) {
            Some(s) if s.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Hold this in `main()` until exit.
pub struct TelemetryGuard {
    pub format: LogFormat,
}

/// Install the global subscriber. Safe to call more than once; later calls
/// leave the first subscriber in place.
#[must_use]
pub fn init() -> TelemetryGuard {
    let format = LogFormat::from_env();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            )
            .try_init(),
    };
    if let Err(e) = installed {
        tracing::debug!(error = %e, "subscriber already installed");
    }

    TelemetryGuard { format }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_labels() {
        assert_eq!(LogFormat::from_label(Some("json")), LogFormat::Json);
        assert_eq!(LogFormat::from_label(Some(" JSON ")), LogFormat::Json);
        assert_eq!(LogFormat::from_label(Some("pretty")), LogFormat::Pretty);
        assert_eq!(LogFormat::from_label(None), LogFormat::Pretty);
    }

    #[test]
    fn init_twice_is_harmless() {
        let _a = init();
        let _b = init();
    }
}
