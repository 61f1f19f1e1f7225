use std::sync::Arc;

use crate::{transport::ObjectMetadata, uploader::error::UploadError};

/// Lifecycle events emitted by an [`Uploader`](crate::uploader::Uploader).
///
/// Events for a given task are totally ordered: `Started` precedes any
/// later event, and exactly one of `{Finished, Cancelled, Error}` is ever
/// emitted, always last.
#[derive(Clone, Debug)]
pub enum UploadEvent {
    Started,
    Paused,
    /// A non-fatal notice — currently only used when rapid-upload fails
    /// with something other than a "not eligible" rejection: the engine
    /// still falls through to chunked upload, but the caller is told why
    /// rapid-upload didn't happen.
    Notice(String),
    Cancelled,
    Error(Arc<UploadError>),
    Finished {
        success: bool,
        metadata: Option<ObjectMetadata>,
    },
}

impl UploadEvent {
    /// Whether this event is one of the three terminal, absorbing events.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Error(_) | Self::Finished { .. })
    }
}
