//! One outbound slice transfer: positions the source stream, submits a
//! 4 MiB window to the remote, returns the slice's server-assigned
//! identifier.

use std::sync::Arc;

use async_stream::stream;
use bytes::Bytes;
use tokio::{
    io::{AsyncReadExt, AsyncSeek, AsyncSeekExt},
    sync::Mutex,
};

use crate::{
    cancel::CancelToken,
    error::TransportError,
    hashing::slice_range,
    throttle::Throttle,
    transport::UploadTransport,
    util::SizeUnit,
};

/// Sub-chunk granularity fed into the transport body stream. Matches the
/// cadence throttling and progress reporting operate at.
const SEND_CHUNK: usize = (SizeUnit::KIBIBYTE * 160) as usize;

/// Transfers slice `slice_index` of a file whose total length is
/// `content_length`. `on_progress` is invoked with the cumulative number of
/// bytes of *this slice* submitted so far — the caller adds
/// `SLICE_WINDOW * len(accepted_slices)` to derive `bytes_uploaded`.
///
/// Returns the identifier the remote assigned, which may be empty — an
/// empty identifier means the slice must be resubmitted without advancing
/// the slice index.
pub async fn send_slice<R>(
    file: &mut R,
    transport: &dyn UploadTransport,
    remote_path: &str,
    upload_session_id: &str,
    slice_index: u64,
    content_length: u64,
    throttle: Option<Arc<Mutex<Throttle<u64>>>>,
    cancel: &CancelToken,
    on_progress: impl Fn(u64) + Send + Sync + 'static,
) -> Result<String, TransportError>
where
    R: tokio::io::AsyncRead + AsyncSeek + Unpin + Send,
{
    let (start, end) = slice_range(slice_index, content_length);
    let len = end - start;

    let pos = file
        .stream_position()
        .await
        .map_err(|e| TransportError::Other(e.to_string()))?;

    if pos != start {
        file.seek(std::io::SeekFrom::Start(start))
            .await
            .map_err(|e| TransportError::Other(e.to_string()))?;
    }

    let mut buffer = vec![0u8; len as usize];
    file.read_exact(&mut buffer)
        .await
        .map_err(|e| TransportError::Other(e.to_string()))?;

    let buffer = crate::util::ChunkedBuffer::new(buffer);
    let cancel = cancel.clone();

    let body = stream! {
        let mut sent: u64 = 0;

        for chunk in buffer.chunks(SEND_CHUNK) {
            if cancel.is_cancelled() {
                break;
            }

            if let Some(throttle) = throttle.as_ref() {
                let mut throttle = throttle.lock().await;
                throttle.advance_by(chunk.len() as u64).await;
            }

            sent += chunk.len() as u64;
            on_progress(sent);

            yield chunk;
        }
    };

    let body: crate::transport::SliceBody = Box::pin(body);

    transport
        .upload_slice(remote_path, upload_session_id, slice_index, body, len)
        .await
}

// Re-exported so callers building a `SliceBody` by hand don't need to know
// which stream crate we used internally.
pub type BoxedBytesStream = std::pin::Pin<Box<dyn futures_core::Stream<Item = Bytes> + Send>>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ObjectMetadata, OnDuplicatePolicy, PrecreateSession};
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::io::Cursor;
    use std::sync::Mutex as StdMutex;

    struct RecordingTransport {
        received: StdMutex<Vec<u8>>,
        reply: String,
    }

    #[async_trait]
    impl UploadTransport for RecordingTransport {
        async fn rapid_upload(
            &self,
            _remote_path: &str,
            _content_length: u64,
            _content_md5: &str,
            _content_crc32: u32,
            _slice_md5: &str,
            _on_duplicate: OnDuplicatePolicy,
        ) -> Result<ObjectMetadata, TransportError> {
            unimplemented!()
        }

        async fn precreate(
            &self,
            _remote_path: &str,
            _slice_count: u64,
        ) -> Result<PrecreateSession, TransportError> {
            unimplemented!()
        }

        async fn upload_slice(
            &self,
            _remote_path: &str,
            _upload_session_id: &str,
            _slice_index: u64,
            mut body: crate::transport::SliceBody,
            _content_length: u64,
        ) -> Result<String, TransportError> {
            let mut collected = Vec::new();
            while let Some(chunk) = body.next().await {
                collected.extend_from_slice(&chunk);
            }
            *self.received.lock().unwrap() = collected;
            Ok(self.reply.clone())
        }

        async fn create_super_file(
            &self,
            _remote_path: &str,
            _upload_session_id: &str,
            _slice_identifiers: &[String],
            _content_length: u64,
        ) -> Result<ObjectMetadata, TransportError> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn sends_the_full_slice_window() {
        let data = vec![9u8; 100];
        let mut cursor = Cursor::new(data.clone());
        let transport = RecordingTransport {
            received: StdMutex::new(vec![]),
            reply: "slice-id-0".into(),
        };
        let cancel = CancelToken::new();

        let id = send_slice(
            &mut cursor,
            &transport,
            "/remote/file",
            "session",
            0,
            100,
            None,
            &cancel,
            |_| {},
        )
        .await
        .unwrap();

        assert_eq!(id, "slice-id-0");
        assert_eq!(*transport.received.lock().unwrap(), data);
    }

    #[tokio::test]
    async fn seeks_only_when_position_differs() {
        let data: Vec<u8> = (0..20).collect();
        let mut cursor = Cursor::new(data.clone());
        cursor.set_position(10);

        let transport = RecordingTransport {
            received: StdMutex::new(vec![]),
            reply: "id".into(),
        };
        let cancel = CancelToken::new();

        // slice_range(0, 20) with SLICE_WINDOW >> 20 yields (0, 20); since
        // the cursor sits at 10 != 0, a seek back to 0 must occur.
        send_slice(
            &mut cursor,
            &transport,
            "/r",
            "s",
            0,
            20,
            None,
            &cancel,
            |_| {},
        )
        .await
        .unwrap();

        assert_eq!(*transport.received.lock().unwrap(), data);
    }

    #[tokio::test]
    async fn reports_cumulative_progress_within_the_slice() {
        let data = vec![1u8; SEND_CHUNK * 2 + 10];
        let mut cursor = Cursor::new(data.clone());
        let transport = RecordingTransport {
            received: StdMutex::new(vec![]),
            reply: "id".into(),
        };
        let cancel = CancelToken::new();
        let progress = Arc::new(StdMutex::new(Vec::new()));
        let progress_clone = progress.clone();

        send_slice(
            &mut cursor,
            &transport,
            "/r",
            "s",
            0,
            data.len() as u64,
            None,
            &cancel,
            move |current| progress_clone.lock().unwrap().push(current),
        )
        .await
        .unwrap();

        let seen = progress.lock().unwrap();
        assert_eq!(seen.last().copied(), Some(data.len() as u64));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }
}
