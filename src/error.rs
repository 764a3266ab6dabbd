//! Error taxonomy for registry API access.
//!
//! Every failure surfaced by this crate is a [`RequestError`] carrying a
//! closed [`ErrorKind`], the triggering URL and a timestamp. HTTP status
//! codes are mapped to kinds in exactly one place ([`ErrorKind::from_status`])
//! and retryability is decided by exactly one predicate
//! ([`ErrorKind::is_retryable`]); call sites never re-derive either from raw
//! status codes.

use std::fmt;
use std::time::SystemTime;

use thiserror::Error;

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RequestError>;

/// Closed set of failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Server asked us to slow down (HTTP 429).
    RateLimited,
    /// The server refuses this network identity (HTTP 403).
    Blocked,
    /// A CAPTCHA challenge page was served instead of data.
    CaptchaRequired,
    /// An operation exceeded its deadline.
    Timeout,
    /// Transport-level failure (DNS, connect, reset).
    Network,
    /// Response body could not be parsed.
    Parse,
    /// The session is no longer accepted (HTTP 401) or could not be acquired.
    SessionExpired,
    /// The requested resource does not exist (HTTP 404).
    NotFound,
    /// Server-side failure (HTTP 5xx).
    Server,
    /// Anything that did not match a known class.
    Unknown,
}

impl ErrorKind {
    /// Returns true exactly for the kinds worth retrying in place.
    ///
    /// This is the single source of truth consulted by the recovery layer.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited | ErrorKind::Timeout | ErrorKind::Network | ErrorKind::Server
        )
    }

    /// Maps an HTTP status code to a kind. The only place this mapping lives.
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => ErrorKind::RateLimited,
            403 => ErrorKind::Blocked,
            401 => ErrorKind::SessionExpired,
            404 => ErrorKind::NotFound,
            500..=599 => ErrorKind::Server,
            _ => ErrorKind::Unknown,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::RateLimited => "rate limited",
            ErrorKind::Blocked => "blocked",
            ErrorKind::CaptchaRequired => "captcha required",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Network => "network error",
            ErrorKind::Parse => "parse error",
            ErrorKind::SessionExpired => "session expired",
            ErrorKind::NotFound => "not found",
            ErrorKind::Server => "server error",
            ErrorKind::Unknown => "unknown error",
        };
        f.write_str(name)
    }
}

/// A classified request failure. Immutable once constructed.
#[derive(Error, Debug, Clone)]
#[error("{kind} at {url}: {message}")]
pub struct RequestError {
    /// Failure classification.
    pub kind: ErrorKind,
    /// Human-readable detail.
    pub message: String,
    /// HTTP status, when the server answered at all.
    pub http_status: Option<u16>,
    /// Server-supplied retry delay (Retry-After), for `RateLimited`.
    pub retry_after_secs: Option<u64>,
    /// URL of the triggering request, empty for non-HTTP failures.
    pub url: String,
    /// When the failure was observed.
    pub timestamp: SystemTime,
}

impl RequestError {
    /// Creates an error of the given kind.
    pub fn new(kind: ErrorKind, url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            http_status: None,
            retry_after_secs: None,
            url: url.into(),
            timestamp: SystemTime::now(),
        }
    }

    /// Creates an error from a non-success HTTP status.
    pub fn from_status(status: u16, url: impl Into<String>, retry_after_secs: Option<u64>) -> Self {
        let kind = ErrorKind::from_status(status);
        Self {
            kind,
            message: format!("HTTP {}", status),
            http_status: Some(status),
            retry_after_secs,
            url: url.into(),
            timestamp: SystemTime::now(),
        }
    }

    /// Creates a timeout error for the given URL.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, url, "operation exceeded its deadline")
    }

    /// Creates a parse error for the given URL.
    pub fn parse(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, url, message)
    }

    /// Creates a session error (acquisition failed or session rejected).
    pub fn session(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SessionExpired, url, message)
    }

    /// Returns whether the carried kind is retryable.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl From<reqwest::Error> for RequestError {
    fn from(err: reqwest::Error) -> Self {
        let url = err.url().map(|u| u.to_string()).unwrap_or_default();
        let kind = if err.is_timeout() {
            ErrorKind::Timeout
        } else if err.is_decode() {
            ErrorKind::Parse
        } else if err.is_connect() || err.is_request() {
            ErrorKind::Network
        } else {
            ErrorKind::Unknown
        };
        Self::new(kind, url, err.to_string())
    }
}
