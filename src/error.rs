//! # Error Types
//!
//! Error handling for the object bus.
//!
//! This module defines all error variants that can occur on a connection,
//! from low-level I/O failures to protocol-level faults relayed by the peer.
//!
//! ## Error Categories
//! - **Fatal connection errors**: I/O failures, malformed frames, unknown
//!   extension tags. These terminate the owning connection.
//! - **Remote faults**: exceptions raised while the peer serviced an
//!   invocation, re-raised locally as [`BusError::Remote`].
//! - **Non-local control transfer**: a tagged throw that escaped the remote
//!   method, surfaced as the distinguished [`BusError::RemoteThrow`].
//! - **Local conditions**: timeouts, closed connections, configuration
//!   problems.
//!
//! All errors implement `std::error::Error` for interoperability.

use std::fmt;
use std::io;
use thiserror::Error;

use crate::core::value::Value;

/// Wire-visible exception class constants shared across modules.
pub mod constants {
    /// Exception class used for unknown invoke targets
    pub const CLASS_NAME_ERROR: &str = "NameError";
    /// Exception class used when a peer yields without a block present
    pub const CLASS_LOCAL_JUMP_ERROR: &str = "LocalJumpError";
    /// Exception class used for faults that have no richer classification
    pub const CLASS_RUNTIME_ERROR: &str = "RuntimeError";
}

/// Build the message carried by a name-resolution error.
pub(crate) fn object_not_found(name: &str) -> String {
    format!("Object not found: {name}")
}

/// An exception relayed across the wire.
///
/// Reconstruction is best-effort: the class survives as a name, the message
/// verbatim, and the backtrace as an opaque list of frames recorded on the
/// raising side.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RemoteException {
    /// Class name of the original exception.
    pub class: String,
    /// Human-readable message.
    pub message: String,
    /// Textual backtrace frames, diagnostics only.
    pub backtrace: Vec<String>,
}

impl RemoteException {
    /// Create an exception with an empty backtrace.
    pub fn new(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            message: message.into(),
            backtrace: Vec::new(),
        }
    }

    /// The `NameError` sent when an Invoke targets an unbound name.
    pub(crate) fn not_found(name: &str) -> Self {
        Self::new(constants::CLASS_NAME_ERROR, object_not_found(name))
    }
}

impl fmt::Display for RemoteException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.class, self.message)
    }
}

impl std::error::Error for RemoteException {}

/// Primary error type for all bus operations.
#[derive(Error, Debug)]
pub enum BusError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Invalid frame header")]
    InvalidHeader,

    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    #[error("Frame too large: {0} bytes")]
    OversizedFrame(usize),

    #[error("Unknown extension tag: {0:#04x}")]
    UnknownTag(i8),

    #[error("Value cannot be sent by reference: {0}")]
    Unserializable(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Operation timed out")]
    Timeout,

    #[error("{0}")]
    Remote(RemoteException),

    #[error("uncaught remote throw")]
    RemoteThrow {
        /// Tag of the non-local control transfer.
        tag: Value,
        /// Value carried by the throw.
        value: Value,
    },

    #[error("Dispatch loop already running")]
    AlreadyRunning,

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl BusError {
    /// True for errors that terminate the owning connection.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BusError::Io(_)
                | BusError::Codec(_)
                | BusError::InvalidHeader
                | BusError::UnsupportedVersion(_)
                | BusError::OversizedFrame(_)
                | BusError::UnknownTag(_)
        )
    }
}

impl From<RemoteException> for BusError {
    fn from(exc: RemoteException) -> Self {
        BusError::Remote(exc)
    }
}

/// Type alias for Results using [`BusError`].
pub type Result<T> = std::result::Result<T, BusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_exception_display() {
        let exc = RemoteException::new("RuntimeError", "Remote error");
        assert_eq!(exc.to_string(), "RuntimeError: Remote error");
    }

    #[test]
    fn not_found_message() {
        let exc = RemoteException::not_found("nonexistent");
        assert_eq!(exc.class, "NameError");
        assert_eq!(exc.message, "Object not found: nonexistent");
    }

    #[test]
    fn fatal_classification() {
        assert!(BusError::InvalidHeader.is_fatal());
        assert!(BusError::Codec("bad marker".into()).is_fatal());
        assert!(!BusError::Timeout.is_fatal());
        assert!(!BusError::Remote(RemoteException::default()).is_fatal());
    }
}
