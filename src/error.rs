//! Error types for the fetch cache
//!
//! Provides unified error handling using thiserror.

use std::fmt;

use thiserror::Error;

// == Error Code ==
/// Category of a failed fetch, derived from the HTTP status or the failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Timeout,
    RateLimited,
    /// Any other 4xx status
    Client,
    /// Any 5xx status
    Server,
    /// Connection or protocol failure before a status was received
    Network,
    /// The in-flight request was cancelled
    Aborted,
    /// The response body could not be decoded
    Decode,
}

impl ErrorCode {
    /// Maps an HTTP status code to its category.
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => ErrorCode::BadRequest,
            401 => ErrorCode::Unauthorized,
            403 => ErrorCode::Forbidden,
            404 => ErrorCode::NotFound,
            408 => ErrorCode::Timeout,
            429 => ErrorCode::RateLimited,
            500..=599 => ErrorCode::Server,
            _ => ErrorCode::Client,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::Client => "CLIENT_ERROR",
            ErrorCode::Server => "SERVER_ERROR",
            ErrorCode::Network => "NETWORK_ERROR",
            ErrorCode::Aborted => "ABORTED",
            ErrorCode::Decode => "DECODE_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// == Fetch Error ==
/// A categorized network failure carrying `{url, status}` context.
///
/// `Clone` so one outcome can be handed to every caller coalesced onto the
/// same in-flight request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message} ({url})")]
pub struct FetchError {
    pub code: ErrorCode,
    pub message: String,
    pub url: String,
    pub status: Option<u16>,
}

impl FetchError {
    /// Builds an error for a non-2xx response.
    pub fn from_status(url: impl Into<String>, status: u16) -> Self {
        Self {
            code: ErrorCode::from_status(status),
            message: format!("request failed with status {}", status),
            url: url.into(),
            status: Some(status),
        }
    }

    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Network,
            message: message.into(),
            url: url.into(),
            status: None,
        }
    }

    pub fn timeout(url: impl Into<String>, after_ms: u64) -> Self {
        Self {
            code: ErrorCode::Timeout,
            message: format!("request timed out after {}ms", after_ms),
            url: url.into(),
            status: None,
        }
    }

    pub fn aborted(url: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Aborted,
            message: "request aborted".to_string(),
            url: url.into(),
            status: None,
        }
    }

    pub fn decode(url: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Decode,
            message: message.into(),
            url: url.into(),
            status: Some(status),
        }
    }

    /// Whether an outer retry layer may reasonably try again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::Timeout | ErrorCode::RateLimited | ErrorCode::Server | ErrorCode::Network
        )
    }
}

// == Storage Error ==
/// Failure at the persistence boundary. Logged and absorbed, never surfaced
/// to callers of the cache.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

// == Result Type Alias ==
/// Convenience Result type for fetch operations.
pub type Result<T> = std::result::Result<T, FetchError>;
