use core::fmt;
use std::error::Error;

use crate::{error::TransportError, util::InvalidValue};

#[derive(Debug)]
pub enum UploadError {
    /// Already in a non-`Init` state when `Start` was called.
    AlreadyStarted,
    /// Local file I/O failed, or the file's size changed out from under the
    /// upload between hashing and finalize.
    Io(std::io::Error),
    /// The transport returned a classified protocol error.
    Transport(TransportError),
    /// Finalize's reported MD5 did not match the known content MD5.
    Md5Mismatch { expected: String, actual: String },
    /// Finalize's reported size did not match `content_length`.
    SizeMismatch { expected: u64, actual: u64 },
    InvalidOptions(InvalidValue),
}

impl Error for UploadError {}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "upload failed, ")?;

        match self {
            Self::AlreadyStarted => write!(f, "task has already been started"),
            Self::Io(err) => write!(f, "local file I/O error: {}", err),
            Self::Transport(err) => write!(f, "{}", err),
            Self::Md5Mismatch { expected, actual } => write!(
                f,
                "MD5 mismatch: expected {}, server reported {}",
                expected, actual
            ),
            Self::SizeMismatch { expected, actual } => write!(
                f,
                "size mismatch: expected {}, server reported {}",
                expected, actual
            ),
            Self::InvalidOptions(err) => write!(f, "{}", err),
        }
    }
}

impl From<TransportError> for UploadError {
    fn from(value: TransportError) -> Self {
        UploadError::Transport(value)
    }
}

impl From<std::io::Error> for UploadError {
    fn from(value: std::io::Error) -> Self {
        UploadError::Io(value)
    }
}

impl From<InvalidValue> for UploadError {
    fn from(value: InvalidValue) -> Self {
        UploadError::InvalidOptions(value)
    }
}

impl UploadError {
    /// A classified protocol error is fatal and distinct from a merely
    /// transient transport failure.
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::Transport(err) if err.is_protocol_error())
    }
}
