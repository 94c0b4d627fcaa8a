//! Error types for Ghostwire
//!
//! Three families live here:
//! - [`GhostwireError`] for construction and configuration failures,
//! - [`CaptureError`] for problems while capturing an exchange (recorded, never returned),
//! - [`TransportError`] for whatever the underlying round tripper failed with.

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Result type for Ghostwire operations
pub type Result<T> = std::result::Result<T, GhostwireError>;

/// Errors that can occur while building or configuring a recorder
#[derive(Debug, Error)]
pub enum GhostwireError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A redaction pattern failed to compile
    #[error("Invalid redaction pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern
        pattern: String,
        /// Why it was rejected
        reason: String,
    },

    /// History size outside the accepted range
    #[error("Invalid history size {size}: must be between 1 and {max}")]
    InvalidHistorySize {
        /// Requested size
        size: usize,
        /// Upper bound
        max: usize,
    },
}

/// Failure while rendering a request or response to wire bytes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DumpError {
    /// Neither the URI nor the headers name a host
    #[error("request has no host")]
    MissingHost,

    /// Declared Content-Length disagrees with the body
    #[error("Content-Length {declared} does not match body length {actual}")]
    ContentLengthMismatch {
        /// Value of the header
        declared: u64,
        /// Actual body length
        actual: u64,
    },

    /// Content-Length header could not be parsed
    #[error("invalid Content-Length header: {0:?}")]
    InvalidContentLength(String),
}

/// Problems recorded while capturing an exchange
///
/// These never reach the caller of `round_trip`; they only show up on the
/// recorded [`Exchange`](crate::Exchange).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// The caller supplied no request
    #[error("request was absent")]
    RequestAbsent,

    /// The round tripper produced no response
    #[error("response was absent")]
    ResponseAbsent,

    /// The message could not be dumped
    #[error("dump failed: {0}")]
    Dump(#[from] DumpError),

    /// The dumper panicked
    #[error("dump panicked: {0}")]
    DumpPanicked(String),
}

/// Error returned by a round tripper
///
/// Cheap to clone so the same value can be recorded and handed back to the
/// caller.
#[derive(Clone)]
pub struct TransportError(Arc<dyn StdError + Send + Sync>);

impl TransportError {
    /// Wrap any error
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self(Arc::new(error))
    }

    /// Build an error from a plain message
    pub fn msg(message: impl Into<String>) -> Self {
        Self(Arc::new(Message(message.into())))
    }

    /// The wrapped error
    #[must_use]
    pub fn inner(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.0
    }

    /// Whether two handles point at the same underlying error
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl StdError for TransportError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for Message {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_clone_shares_inner() {
        let error = TransportError::msg("connection refused");
        let clone = error.clone();

        assert!(error.same_as(&clone));
        assert_eq!(clone.to_string(), "connection refused");
    }

    #[test]
    fn test_transport_error_wraps_io() {
        let io = io::Error::new(io::ErrorKind::TimedOut, "timed out");
        let error = TransportError::new(io);

        assert_eq!(error.to_string(), "timed out");
        assert!(error.inner().downcast_ref::<io::Error>().is_some());
    }

    #[test]
    fn test_capture_error_display() {
        assert_eq!(CaptureError::RequestAbsent.to_string(), "request was absent");
        assert_eq!(
            CaptureError::from(DumpError::MissingHost).to_string(),
            "dump failed: request has no host"
        );
    }
}
