use core::fmt;
use std::error::Error;

use serde::{Deserialize, Serialize};

use crate::util::InvalidValue;

/// Error surfaced by the injected [`UploadTransport`](crate::transport::UploadTransport).
///
/// Mirrors the shape of a typical object-store error response: a protocol
/// error carries a server-assigned code, while a transport error covers
/// everything below the protocol layer (connection resets, timeouts, local
/// I/O while streaming a request body).
#[derive(Debug)]
pub enum TransportError {
    /// The remote rejected the request with a known error code. This is the
    /// "classified protocol error" referenced throughout the upload state
    /// machine; it is always fatal to the task that received it.
    Protocol(ProtocolError),
    /// Anything else: a dropped connection, a timeout, a malformed
    /// response. Not inherently fatal — callers may retry.
    Other(String),
}

impl Error for TransportError {}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Protocol(err) => write!(f, "remote rejected request: {}", err),
            Self::Other(msg) => write!(f, "transport error: {}", msg),
        }
    }
}

impl TransportError {
    /// Whether this error carries a classified protocol error code, as
    /// opposed to a transient transport-level failure.
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }
}

#[derive(Clone, Deserialize, Debug, Serialize)]
pub struct ProtocolError {
    pub code: String,
    pub message: Option<String>,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", serde_json::to_string(self).expect("valid format"))
    }
}

impl Error for ProtocolError {}

/// Error raised by [`UploaderPool`](crate::pool::UploaderPool) control operations.
#[derive(Debug)]
pub enum PoolError {
    /// The pool has been disposed and can no longer accept control operations.
    Disposed,
    /// No task with the given id exists in the pool.
    UnknownTask(u64),
    InvalidOptions(InvalidValue),
}

impl Error for PoolError {}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Disposed => write!(f, "pool has been disposed"),
            Self::UnknownTask(id) => write!(f, "no task with id {}", id),
            Self::InvalidOptions(err) => write!(f, "{}", err),
        }
    }
}

impl From<InvalidValue> for PoolError {
    fn from(value: InvalidValue) -> Self {
        PoolError::InvalidOptions(value)
    }
}
