//! The consumer surface the upload engine requires from the remote object
//! store. HTTP call marshalling, authentication, and cookie persistence are
//! explicitly out of scope for this crate (see the crate root docs) — a
//! caller supplies a concrete `UploadTransport` implementation (a real HTTP
//! client, or a fake for tests) and the engine drives it.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;

use crate::error::TransportError;

/// What happens when the remote already has a file at the target path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum OnDuplicatePolicy {
    #[default]
    Overwrite,
    NewCopy,
    Skip,
}

/// Metadata the remote returns once a file has materialized, whether via
/// rapid upload or `create_super_file`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Non-zero iff the file actually materialized on the server.
    pub fs_id: u64,
    pub md5: String,
    pub size: u64,
}

impl ObjectMetadata {
    pub fn materialized(&self) -> bool {
        self.fs_id != 0
    }
}

/// Returned by `precreate`; carries the session id chunked uploads attach to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrecreateSession {
    pub upload_session_id: String,
}

/// A stream of body chunks handed to the transport for one slice transfer.
/// The engine (not the transport) is responsible for throttling and
/// progress reporting as it produces these chunks — see
/// [`crate::slice::send_slice`].
pub type SliceBody = std::pin::Pin<Box<dyn Stream<Item = Bytes> + Send>>;

/// The remote transport collaborator. Implementations own HTTP
/// marshalling, authentication, and retries below the protocol layer;
/// everything above (precreate/slice/finalize sequencing, rapid-upload
/// attempts, verification) lives in [`crate::uploader::Uploader`].
#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// Attempts the content-addressed rapid-upload shortcut. Returns
    /// `Ok(metadata)` with `metadata.materialized() == false` (or an
    /// `Err(TransportError::Protocol(_))` carrying a "not eligible" code)
    /// when the remote declines and the engine should fall through to a
    /// chunked upload.
    async fn rapid_upload(
        &self,
        remote_path: &str,
        content_length: u64,
        content_md5: &str,
        content_crc32: u32,
        slice_md5: &str,
        on_duplicate: OnDuplicatePolicy,
    ) -> Result<ObjectMetadata, TransportError>;

    /// Allocates an `upload_session_id` for a forthcoming chunked upload.
    async fn precreate(
        &self,
        remote_path: &str,
        slice_count: u64,
    ) -> Result<PrecreateSession, TransportError>;

    /// Transfers one slice. An empty identifier means the remote accepted
    /// the bytes but did not positionally confirm them — the caller must
    /// retry without advancing its slice index.
    async fn upload_slice(
        &self,
        remote_path: &str,
        upload_session_id: &str,
        slice_index: u64,
        body: SliceBody,
        content_length: u64,
    ) -> Result<String, TransportError>;

    /// Assembles accepted slice identifiers into a single stored object.
    /// `fs_id == 0` on the returned metadata signals "not ready yet, call
    /// again" and is not an error.
    async fn create_super_file(
        &self,
        remote_path: &str,
        upload_session_id: &str,
        slice_identifiers: &[String],
        content_length: u64,
    ) -> Result<ObjectMetadata, TransportError>;
}

/// External key-management collaborator for upload-side encryption. This
/// crate models only the interface: when [`crate::uploader::UploaderOptions::encrypt`]
/// is set, the local reader is wrapped through the filter before hashing
/// and transfer, transparent to the rest of the protocol.
#[async_trait]
pub trait EncryptionFilter: Send + Sync {
    /// Wraps a plaintext reader into a ciphertext reader. The returned
    /// reader's length need not equal the plaintext length; callers must
    /// re-derive `content_length` from it before hashing.
    async fn wrap(
        &self,
        reader: Box<dyn crate::uploader::AsyncFileReader>,
    ) -> Result<Box<dyn crate::uploader::AsyncFileReader>, TransportError>;
}

/// External metadata-cache collaborator keyed by path + mtime + size, so a
/// caller can skip re-hashing files it has already seen. Stale entries are
/// the caller's responsibility per [`crate::uploader::TrackedFile`]'s
/// invariant.
#[async_trait]
pub trait DigestCache: Send + Sync {
    async fn get(&self, path: &str, mtime: u64, size: u64) -> Option<CachedDigests>;
    async fn put(&self, path: &str, mtime: u64, size: u64, digests: CachedDigests);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedDigests {
    pub content_md5: String,
    pub content_crc32: u32,
    pub slice_md5: String,
}

/// Trivial in-memory map, handy for tests and small CLIs; real
/// deployments are expected to inject their own persistent cache.
#[derive(Default)]
pub struct InMemoryDigestCache {
    entries: tokio::sync::Mutex<HashMap<(String, u64, u64), CachedDigests>>,
}

#[async_trait]
impl DigestCache for InMemoryDigestCache {
    async fn get(&self, path: &str, mtime: u64, size: u64) -> Option<CachedDigests> {
        self.entries
            .lock()
            .await
            .get(&(path.to_string(), mtime, size))
            .cloned()
    }

    async fn put(&self, path: &str, mtime: u64, size: u64, digests: CachedDigests) {
        self.entries
            .lock()
            .await
            .insert((path.to_string(), mtime, size), digests);
    }
}
