//! Error types for redbloom.
//!
//! Failures reported by the backing store are described by [`StoreError`].
//! The filter wraps them in [`Error`] together with the operation that was
//! running, so callers can tell a failed construction from a failed batch.

use std::fmt;
use std::io;
use thiserror::Error;

/// The result type used throughout redbloom.
pub type Result<T> = std::result::Result<T, Error>;

/// The result type returned by [`crate::store::Store`] implementations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Classification of a backing-store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreErrorKind {
    /// The store could not be reached, or the connection dropped.
    ConnectionFailed,
    /// A shard key exists but holds something other than a byte string.
    WrongKeyType,
    /// A round trip exceeded the transport deadline.
    Timeout,
    /// Any other failure reported by the store.
    Unknown,
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreErrorKind::ConnectionFailed => "connection failed",
            StoreErrorKind::WrongKeyType => "wrong key type",
            StoreErrorKind::Timeout => "timeout",
            StoreErrorKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A failure reported by the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Store error ({kind}): {detail}")]
pub struct StoreError {
    /// What went wrong.
    pub kind: StoreErrorKind,
    /// Detail as reported by the store or transport.
    pub detail: String,
}

impl StoreError {
    /// Creates a new store error.
    pub fn new(kind: StoreErrorKind, detail: impl Into<String>) -> Self {
        Self { kind, detail: detail.into() }
    }

    /// Creates a new connection error.
    pub fn connection_failed(detail: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::ConnectionFailed, detail)
    }

    /// Creates a new wrong key type error.
    pub fn wrong_type(detail: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::WrongKeyType, detail)
    }

    /// Creates a new timeout error.
    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Timeout, detail)
    }

    /// Creates a new error of unknown kind.
    pub fn unknown(detail: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Unknown, detail)
    }

    /// Classifies an error reply sent back by the server.
    ///
    /// Servers prefix error replies with an upper-case code; `WRONGTYPE`
    /// marks a key holding an incompatible value.
    pub fn from_reply(message: &str) -> Self {
        if message.starts_with("WRONGTYPE") {
            Self::wrong_type(message)
        } else {
            Self::unknown(message)
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Self::timeout(err.to_string()),
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::AddrNotAvailable => Self::connection_failed(err.to_string()),
            _ => Self::unknown(err.to_string()),
        }
    }
}

/// The error type for filter operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Capacity, error rate or layout settings are out of range.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The filter could not be constructed because the store was unusable.
    #[error("Filter construction failed: {0}")]
    Construction(#[source] StoreError),

    /// A filter operation failed in the store. None of its effect should be
    /// assumed applied.
    #[error("{operation} failed for {items} item(s): {source}")]
    Operation {
        /// Name of the filter operation (`add`, `update`, ...).
        operation: &'static str,
        /// Number of items the operation covered.
        items: usize,
        /// Underlying store failure.
        #[source]
        source: StoreError,
    },
}

impl Error {
    /// Creates a new invalid parameter error.
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Error::InvalidParameter(msg.into())
    }

    /// Wraps a store failure seen by a filter operation.
    pub fn operation(operation: &'static str, items: usize, source: StoreError) -> Self {
        Error::Operation { operation, items, source }
    }

    /// Returns the store error kind behind this error, if any.
    pub fn store_kind(&self) -> Option<StoreErrorKind> {
        match self {
            Error::InvalidParameter(_) => None,
            Error::Construction(e) => Some(e.kind),
            Error::Operation { source, .. } => Some(source.kind),
        }
    }
}
