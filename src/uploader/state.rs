//! The pieces of task state that exist independently of the state machine
//! driving them: what file is being uploaded, and which of the coarse
//! lifecycle states it is currently in.

use std::{
    io::SeekFrom,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};

use crate::hashing::KnownDigests;

/// Anything the engine can read and seek locally — a plain file, or
/// whatever an [`EncryptionFilter`](crate::transport::EncryptionFilter)
/// wraps it in.
pub trait AsyncFileReader: AsyncRead + AsyncSeek + Unpin + Send {}

impl<T: AsyncRead + AsyncSeek + Unpin + Send> AsyncFileReader for T {}

// `Box<dyn AsyncFileReader>` needs to satisfy the same `AsyncRead + AsyncSeek`
// bounds as a concrete reader so it can be handed to `hash_file`/`send_slice`
// without those functions knowing whether a file went through an encryption
// filter. Forwarding by hand (rather than relying on the blanket impl above)
// is required because a trait object doesn't automatically implement its own
// supertraits.
impl AsyncRead for Box<dyn AsyncFileReader> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut **self).poll_read(cx, buf)
    }
}

impl AsyncSeek for Box<dyn AsyncFileReader> {
    fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> std::io::Result<()> {
        Pin::new(&mut **self).start_seek(position)
    }

    fn poll_complete(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<u64>> {
        Pin::new(&mut **self).poll_complete(cx)
    }
}

/// Identity of a file the pool has been asked to upload: where it lives
/// locally, where it should land remotely, and whatever digests the
/// caller already trusts for it.
///
/// `mtime` and `size` are the cache key a [`DigestCache`](crate::transport::DigestCache)
/// is consulted with; a caller that reuses a `TrackedFile` after the
/// underlying file changed on disk is responsible for clearing `known`.
#[derive(Clone, Debug)]
pub struct TrackedFile {
    pub local_path: String,
    pub remote_path: String,
    pub mtime: u64,
    pub known: KnownDigests,
}

impl TrackedFile {
    pub fn new(local_path: impl Into<String>, remote_path: impl Into<String>, mtime: u64) -> Self {
        Self {
            local_path: local_path.into(),
            remote_path: remote_path.into(),
            mtime,
            known: KnownDigests::default(),
        }
    }

    pub fn with_known_digests(mut self, known: KnownDigests) -> Self {
        self.known = known;
        self
    }
}

/// The coarse lifecycle state of a single upload task. `Error` and the
/// two `Finished` outcomes are all
/// absorbing — once left `Init`, a task never returns to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadState {
    Init,
    Hashing,
    Transferring,
    Paused,
    Cancelled,
    Error,
    Finished,
}

impl UploadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Error | Self::Finished)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Hashing | Self::Transferring)
    }
}
