//! Streams a local file once, producing the digests the rapid-upload
//! shortcut and the chunked-upload finalize step both need.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{cancel::CancelToken, transport::CachedDigests};

/// Size of one upload slice. The last slice of a file may be shorter.
pub const SLICE_WINDOW: u64 = 4 * 1024 * 1024;
/// Window over which `slice_md5` is computed; rapid upload needs at least
/// this many bytes to be attempted.
pub const HEAD_WINDOW: u64 = 262_144;
/// Read granularity; progress callbacks fire at this cadence.
const READ_BUFFER: usize = 8192;

/// Digests the caller already has in hand (from a previous run, or an
/// external digest cache) and trusts to be current.
#[derive(Clone, Debug, Default)]
pub struct KnownDigests {
    pub content_length: Option<u64>,
    pub content_md5: Option<String>,
    pub content_crc32: Option<u32>,
    pub slice_md5: Option<String>,
}

impl From<CachedDigests> for KnownDigests {
    fn from(value: CachedDigests) -> Self {
        Self {
            content_length: None,
            content_md5: Some(value.content_md5),
            content_crc32: Some(value.content_crc32),
            slice_md5: Some(value.slice_md5),
        }
    }
}

/// The full set of digests required to attempt rapid upload and to verify
/// finalize. `slice_md5` is empty when `content_length < HEAD_WINDOW`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComputedDigests {
    pub content_length: u64,
    pub content_md5: String,
    pub content_crc32: u32,
    pub slice_md5: String,
}

impl ComputedDigests {
    /// Whether rapid upload should even be attempted for a file with these
    /// digests: needs a head-window digest to offer the remote, which in
    /// turn requires the file be at least `HEAD_WINDOW` bytes long.
    pub fn rapid_upload_eligible(&self) -> bool {
        self.content_length >= HEAD_WINDOW && !self.slice_md5.is_empty()
    }
}

/// Progress callback: cumulative bytes read so far. The total isn't known
/// up front for a generic streaming reader, so only the running count is
/// reported.
pub type HashProgress = Box<dyn FnMut(u64) + Send>;

/// Outcome of a hashing pass: either it ran to completion, or `cancel`
/// fired partway through and the partial digests were discarded.
#[derive(Debug)]
pub enum HashOutcome {
    Completed(ComputedDigests),
    Interrupted,
}

/// Reads `reader` sequentially, filling in only the digests `known` is
/// missing. Fields present in `known` are trusted verbatim — this crate
/// never re-derives a digest it was told is already correct. Checked
/// against `cancel` at each read, mirroring the slice-sending loop, so a
/// pause/cancel issued mid-hash is observed within one `READ_BUFFER`
/// rather than only after the whole file is read.
pub async fn hash_file<R>(
    mut reader: R,
    known: KnownDigests,
    cancel: &CancelToken,
    mut progress: Option<HashProgress>,
) -> std::io::Result<HashOutcome>
where
    R: AsyncRead + Unpin,
{
    if let (Some(content_length), Some(content_md5), Some(content_crc32), Some(slice_md5)) = (
        known.content_length,
        &known.content_md5,
        known.content_crc32,
        &known.slice_md5,
    ) {
        return Ok(HashOutcome::Completed(ComputedDigests {
            content_length,
            content_md5: content_md5.clone(),
            content_crc32,
            slice_md5: slice_md5.clone(),
        }));
    }

    let mut full_ctx = md5::Context::new();
    let mut head_ctx = md5::Context::new();
    let mut crc = crc32fast::Hasher::new();
    let mut buffer = vec![0u8; READ_BUFFER];
    let mut total_read: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            return Ok(HashOutcome::Interrupted);
        }

        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            break;
        }

        let chunk = &buffer[..n];
        full_ctx.consume(chunk);
        crc.update(chunk);

        if total_read < HEAD_WINDOW {
            let take = ((HEAD_WINDOW - total_read) as usize).min(n);
            head_ctx.consume(&chunk[..take]);
        }

        total_read += n as u64;

        if let Some(cb) = progress.as_mut() {
            cb(total_read);
        }
    }

    let content_length = known.content_length.unwrap_or(total_read);
    let content_md5 = known
        .content_md5
        .unwrap_or_else(|| format!("{:x}", full_ctx.compute()));
    let content_crc32 = known.content_crc32.unwrap_or_else(|| crc.finalize());
    let slice_md5 = known.slice_md5.unwrap_or_else(|| {
        if content_length < HEAD_WINDOW {
            String::new()
        } else {
            format!("{:x}", head_ctx.compute())
        }
    });

    Ok(HashOutcome::Completed(ComputedDigests {
        content_length,
        content_md5,
        content_crc32,
        slice_md5,
    }))
}

/// `⌈content_length / SLICE_WINDOW⌉`, except a zero-length file still has
/// exactly one (empty) slice.
pub fn slice_count(content_length: u64) -> u64 {
    if content_length == 0 {
        1
    } else {
        (content_length + SLICE_WINDOW - 1) / SLICE_WINDOW
    }
}

/// Byte range `[start, end)` for slice `index`, under strict positional
/// indexing.
pub fn slice_range(index: u64, content_length: u64) -> (u64, u64) {
    let start = index * SLICE_WINDOW;
    let end = (start + SLICE_WINDOW).min(content_length);
    (start, end)
}
