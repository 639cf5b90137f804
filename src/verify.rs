//! Checks that the deployed code saw the metadata service.
//!
//! The HTTP fixture answers with the JSON returned by the metadata client,
//! which carries an `isAvailable` flag. Transport problems are reported as
//! [`VerifyError::Request`] and never retried; a well-formed reply with the
//! wrong payload is a [`VerifyError::Assertion`].

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use thiserror::Error;

use crate::deploy::BuildLog;

/// Markers the Cloud Build fixture prints when detection succeeds.
pub const BUILD_LOG_MARKERS: [&str; 2] = [
    "isAvailable: true",
    r#""default":{"aliases":["default"],"email""#,
];

/// Errors raised while verifying a deployment.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum VerifyError {
    /// Raised when the HTTP client cannot be constructed.
    #[error("failed to build http client: {0}")]
    Client(String),
    /// Raised when the request fails or the function answers with an error
    /// status.
    #[error("request to {url} failed: {message}")]
    Request {
        /// URL that was requested.
        url: String,
        /// Transport error or status description.
        message: String,
    },
    /// Raised when the payload does not show a detected metadata service.
    #[error("assertion failed: {0}")]
    Assertion(String),
}

/// Issues the single verification request.
#[derive(Clone, Debug)]
pub struct Verifier {
    http: Client,
}

impl Verifier {
    /// Creates a verifier with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Client`] when the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, VerifyError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| VerifyError::Client(err.to_string()))?;
        Ok(Self { http })
    }

    /// Fetches `url` and returns the decoded JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Request`] on transport failure or a non-2xx
    /// status and [`VerifyError::Assertion`] when the body is not JSON.
    pub async fn fetch(&self, url: &str) -> Result<Value, VerifyError> {
        let request_error = |message: String| VerifyError::Request {
            url: url.to_owned(),
            message,
        };
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| request_error(err.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| request_error(err.to_string()))?;
        if !status.is_success() {
            return Err(request_error(format!("http {}: {body}", status.as_u16())));
        }

        serde_json::from_str(&body)
            .map_err(|err| VerifyError::Assertion(format!("response is not JSON ({err}): {body}")))
    }

    /// Fetches `url` and requires `isAvailable` to be `true`.
    ///
    /// # Errors
    ///
    /// Returns any error from [`Verifier::fetch`], or
    /// [`VerifyError::Assertion`] when the flag is missing or false.
    pub async fn verify(&self, url: &str) -> Result<Value, VerifyError> {
        let body = self.fetch(url).await?;
        tracing::info!(%url, response = %body, "function responded");
        check_available(&body)?;
        Ok(body)
    }
}

/// Requires `body.isAvailable` to be the boolean `true`.
///
/// # Errors
///
/// Returns [`VerifyError::Assertion`] otherwise.
pub fn check_available(body: &Value) -> Result<(), VerifyError> {
    match body.get("isAvailable") {
        Some(Value::Bool(true)) => Ok(()),
        Some(other) => Err(VerifyError::Assertion(format!(
            "expected isAvailable to be true, got {other}"
        ))),
        None => Err(VerifyError::Assertion(format!(
            "response has no isAvailable field: {body}"
        ))),
    }
}

/// Requires every entry of [`BUILD_LOG_MARKERS`] to appear in the log.
///
/// # Errors
///
/// Returns [`VerifyError::Assertion`] naming the first missing marker.
pub fn check_build_log(log: &BuildLog) -> Result<(), VerifyError> {
    for marker in BUILD_LOG_MARKERS {
        if !log.text.contains(marker) {
            return Err(VerifyError::Assertion(format!(
                "build log does not contain {marker}"
            )));
        }
    }
    Ok(())
}
