//! Error type for the Cloud Functions REST client.

use thiserror::Error;

/// Errors raised while talking to the Cloud Functions API.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum FunctionsApiError {
    /// Raised when the HTTP client cannot be constructed.
    #[error("failed to build http client: {message}")]
    Client {
        /// Message returned by the HTTP library.
        message: String,
    },
    /// Raised when the request could not be sent or the body not read.
    #[error("{operation} request failed: {message}")]
    Transport {
        /// API operation being attempted (for example `list`).
        operation: String,
        /// Message returned by the HTTP library.
        message: String,
    },
    /// Raised when the API answers with a non-success status.
    #[error("{operation} returned http {status}: {body}")]
    Status {
        /// API operation being attempted.
        operation: String,
        /// HTTP status code.
        status: u16,
        /// Response body, usually a JSON error document.
        body: String,
    },
    /// Raised when a response body does not match the expected shape.
    #[error("failed to parse {operation} response: {message}")]
    Parse {
        /// API operation being attempted.
        operation: String,
        /// Parser error message.
        message: String,
    },
}
