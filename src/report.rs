//! HTTP client for the reporting endpoint.
//!
//! Result documents are POSTed as JSON. One attempt per document: a
//! transport error or non-2xx status is logged with the response body and
//! returned to the caller.

use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, instrument};

use crate::error::RunnerError;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Blocking JSON POST client.
#[derive(Debug, Clone)]
pub struct ReportClient {
    client: reqwest::blocking::Client,
}

impl ReportClient {
    /// A client whose requests give up after `timeout`.
    ///
    /// # Errors
    /// Returns [`RunnerError::Report`] if the TLS backend cannot be set up.
    pub fn new(timeout: Duration) -> Result<Self, RunnerError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tas/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RunnerError::Report {
                url: String::new(),
                message: format!("building HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }

    /// POST `body` to `url` as `application/json`.
    ///
    /// # Errors
    /// Returns [`RunnerError::Report`] on transport failure or a non-2xx status.
    #[instrument(skip(self, body))]
    pub fn post<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<(), RunnerError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .map_err(|e| {
                error!(error = %e, "report request failed");
                RunnerError::Report {
                    url: url.to_owned(),
                    message: e.to_string(),
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            error!(status = status.as_u16(), body = %text, "report rejected");
            return Err(RunnerError::Report {
                url: url.to_owned(),
                message: format!("status {status}: {text}"),
            });
        }
        info!(status = status.as_u16(), "report accepted");
        Ok(())
    }
}
