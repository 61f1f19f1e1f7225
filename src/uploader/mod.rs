//! The per-file upload state machine and everything it needs:
//! configuration, errors, lifecycle events, and progress stats.

pub mod error;
pub mod events;
pub mod options;
pub mod state;
pub mod stats;
#[allow(clippy::module_inception)]
pub mod uploader;

pub use error::UploadError;
pub use events::UploadEvent;
pub use options::UploaderOptions;
pub use state::{AsyncFileReader, TrackedFile, UploadState};
pub use stats::{CurrentUploadStats, UploadStats};
pub use uploader::Uploader;
