//! Error types and result alias for duck-core operations.
//!
//! Failures of individual package resolutions are *not* errors: they are
//! recorded as a [`crate::manifest::ResolutionStatus`] on the partial
//! manifest and counted, so one bad package never aborts a resolve. The
//! variants here cover everything else: transport, decoding, storage and
//! configuration.

use thiserror::Error;

/// The main error type for duck-core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation failed (lockfile, import map, install tree).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Network operation failed before an HTTP status was available.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Binary codec input was truncated or malformed.
    ///
    /// Propagated to the caller of the codec; never surfaced as a node
    /// status.
    #[error("Decode error: {0}")]
    Decode(String),

    /// JSON or msgpack (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Persistent cache operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid registrar template, unreachable cache directory, or a bad
    /// flag combination. Fatal before any resolution starts.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A version or range expression could not be understood.
    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    /// Operation exceeded its deadline.
    #[error("Timeout: {0}")]
    Timeout(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<sled::Error> for Error {
    fn from(err: sled::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl Error {
    /// Whether a retry might succeed.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }
}

/// Convenience alias used throughout duck-core.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn display_includes_message() {
        let err = Error::Decode("truncated varint".into());
        assert!(err.to_string().contains("truncated varint"));
        assert!(err.to_string().contains("Decode"));
    }

    #[test]
    fn recoverability() {
        assert!(Error::Timeout("deadline".into()).is_recoverable());
        assert!(Error::Io(io::Error::new(io::ErrorKind::TimedOut, "t")).is_recoverable());
        assert!(!Error::Config("bad registrar".into()).is_recoverable());
        assert!(!Error::Decode("bad".into()).is_recoverable());
    }

    #[test]
    fn io_source_chain_preserved() {
        let err: Error = io::Error::new(io::ErrorKind::PermissionDenied, "denied").into();
        let source = std::error::Error::source(&err).unwrap();
        assert!(source.to_string().contains("denied"));
    }
}
