use std::time::Duration;

use reqwest::header::InvalidHeaderValue;
use thiserror::Error;

/// Result type for `rsroyale`, using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Enum for `rsroyale` errors.
///
/// Transport and protocol failures are raised by the request pipeline, with
/// one deliberate exception: when a still-fresh cache entry exists for the
/// failed request, the client silently substitutes the cached data instead of
/// propagating the error (availability over consistency). Everything else
/// reaches the caller unchanged; the client never retries on its own.
#[derive(Debug, Error)]
pub enum Error {
    /// The request was rejected before any network call was made: malformed
    /// resource tag, invalid search filter or query parameter value.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The token is invalid or lacks permission (HTTP 401/403).
    #[error("unauthorized (HTTP {status}): {message}")]
    Unauthorized { status: u16, message: String },

    /// The requested resource does not exist (HTTP 400/404).
    #[error("not found (HTTP {status}): {message}")]
    NotFound { status: u16, message: String },

    /// The resource exists but is not opted into tracking (HTTP 417).
    #[error("resource not tracked: {message}")]
    NotTracked { message: String },

    /// The server enforced its rate limit (HTTP 429).
    #[error("rate limited by the server: {message}")]
    RateLimited { message: String },

    /// The client-side quota tracker predicted a guaranteed 429 and refused
    /// to burn the call. Carries the duration until the quota resets.
    #[error("rate limit exhausted, retry in {retry_after:?}")]
    RateLimitAnticipated { retry_after: Duration },

    /// The API servers are having issues or are in maintenance (HTTP 5xx).
    #[error("server fault (HTTP {status}): {message}")]
    ServerFault { status: u16, message: String },

    /// The request did not complete within the configured timeout.
    #[error("API request timed out")]
    Timeout,

    /// The request could not be sent or the connection dropped mid-flight.
    #[error("connection failure: {0}")]
    Connection(String),

    /// A status code outside the documented mapping.
    #[error("unexpected HTTP status {status}: {message}")]
    UnexpectedStatus { status: u16, message: String },

    /// The cache database failed. Contains a description of the error.
    #[error("cache error: {0}")]
    Cache(#[from] rusqlite::Error),

    /// The payload could not be decoded into the requested shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// The client couldn't be created. Contains a description of the error.
    #[error("couldn't create client: {0}")]
    CannotCreateClient(String),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Timeout
        } else {
            Error::Connection(e.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Error {
        Error::Decode(e.to_string())
    }
}

impl From<InvalidHeaderValue> for Error {
    fn from(e: InvalidHeaderValue) -> Error {
        Error::CannotCreateClient(format!("invalid header value: {}", e))
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Error {
        Error::Validation(format!("invalid URL: {}", e))
    }
}
