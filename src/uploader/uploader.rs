//! The per-file state machine: hash precompute, rapid-upload attempt,
//! slice-by-slice chunked transfer, finalize, verify.

use std::{sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{
    cancel::CancelToken,
    error::TransportError,
    hashing::{self, slice_count, ComputedDigests, HashOutcome, KnownDigests},
    slice,
    throttle::Throttle,
    transport::{
        CachedDigests, DigestCache, EncryptionFilter, ObjectMetadata, UploadTransport,
    },
    uploader::{
        error::UploadError,
        events::UploadEvent,
        options::UploaderOptions,
        state::{AsyncFileReader, TrackedFile, UploadState},
        stats::{CurrentUploadStats, UploadStats},
    },
    util::{EventCallback, IsValid, WriteLockArc},
};

/// Protocol code the transport uses to reject a rapid-upload attempt as
/// ineligible, distinguishing it from any other failure.
const RAPID_UPLOAD_NOT_ELIGIBLE: &str = "not_eligible";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ControlIntent {
    Running,
    Pause,
    Cancel,
}

/// Either a phase completed normally, or the run loop was asked to stop —
/// distinguishing the two lets phase helpers unwind through `?` without
/// conflating "pause/cancel observed" with an actual error.
enum Interrupt {
    Paused,
    Cancelled,
    /// Local file I/O failed (missing file, read error, size change under
    /// the upload) — fatal and distinct from a classified protocol error:
    /// this one transitions to `Error`, not `Cancelled`.
    Errored(UploadError),
}

type PhaseResult<T> = Result<T, Interrupt>;

/// Drives one file through the upload state machine. Constructed by
/// [`crate::pool::UploaderPool`], but usable standalone.
pub struct Uploader {
    pub id: u64,
    pub file: TrackedFile,
    options: UploaderOptions,
    transport: Arc<dyn UploadTransport>,
    encryption: Option<Arc<dyn EncryptionFilter>>,
    digest_cache: Option<Arc<dyn DigestCache>>,
    on_event: EventCallback<UploadEvent>,

    state: WriteLockArc<UploadState>,
    intent: WriteLockArc<ControlIntent>,
    abort: WriteLockArc<CancelToken>,
    upload_session_id: WriteLockArc<String>,
    accepted_slices: WriteLockArc<Vec<String>>,
    digests: WriteLockArc<Option<ComputedDigests>>,
    throttle: WriteLockArc<Option<Arc<Mutex<Throttle<u64>>>>>,
    stats: Arc<UploadStats>,
}

impl Uploader {
    pub fn new(
        id: u64,
        file: TrackedFile,
        options: UploaderOptions,
        transport: Arc<dyn UploadTransport>,
        encryption: Option<Arc<dyn EncryptionFilter>>,
        digest_cache: Option<Arc<dyn DigestCache>>,
        on_event: EventCallback<UploadEvent>,
    ) -> Result<Self, UploadError> {
        options.is_valid()?;

        let throttle = options
            .speed_throttle
            .clone()
            .map(|t| Arc::new(Mutex::new(t)));
        let known_length = file.known.content_length.unwrap_or(0);

        Ok(Self {
            id,
            file,
            options,
            transport,
            encryption,
            digest_cache,
            on_event,
            state: WriteLockArc::new(UploadState::Init),
            intent: WriteLockArc::new(ControlIntent::Running),
            abort: WriteLockArc::new(CancelToken::new()),
            upload_session_id: WriteLockArc::new(String::new()),
            accepted_slices: WriteLockArc::new(Vec::new()),
            digests: WriteLockArc::new(None),
            throttle: WriteLockArc::new(throttle),
            stats: Arc::new(UploadStats::new(known_length)),
        })
    }

    pub fn state(&self) -> UploadState {
        *self.state
    }

    pub fn current_stats(&self) -> CurrentUploadStats {
        self.stats.current_stats()
    }

    pub fn accepted_slice_count(&self) -> usize {
        self.accepted_slices.len()
    }

    pub fn accepted_slices(&self) -> Vec<String> {
        self.accepted_slices.get()
    }

    /// Overrides the per-task throttle, e.g. with the pool's apportioned
    /// share of its total bandwidth limit.
    pub async fn set_throttle(&self, throttle: Option<Arc<Mutex<Throttle<u64>>>>) {
        self.throttle.set(throttle).await;
    }

    /// Signals the worker to abandon its in-flight request and settle into
    /// `Paused`, preserving `accepted_slices` and all digests so a later
    /// `run` resumes the slice loop at the right index.
    /// A no-op on a task already in a terminal state.
    pub async fn pause(&self) {
        if self.state.is_terminal() {
            return;
        }
        self.intent.set(ControlIntent::Pause).await;
        self.abort.cancel();
    }

    /// Signals the worker to abandon its in-flight request and settle into
    /// `Cancelled`. A no-op on a task already in a terminal state.
    pub async fn cancel(&self) {
        if self.state.is_terminal() {
            return;
        }
        self.intent.set(ControlIntent::Cancel).await;
        self.abort.cancel();
    }

    /// Transitions a task directly to `Cancelled` when no worker loop is
    /// currently executing to observe the abort signal — `Init` (never
    /// started) or `Paused` (its prior `run` already returned). Returns
    /// whether it did so, so a caller like
    /// [`crate::pool::UploaderPool`] knows whether it must perform its own
    /// terminal-event bookkeeping, since in this path `run` never will.
    pub async fn force_cancel_if_idle(&self) -> bool {
        if matches!(*self.state, UploadState::Init | UploadState::Paused) {
            self.state.set(UploadState::Cancelled).await;
            self.emit(UploadEvent::Cancelled).await;
            true
        } else {
            false
        }
    }

    /// Runs the state machine to completion (one of the three terminal
    /// events). Called by the pool worker; also usable standalone.
    /// Re-entrant after `pause`: resumes at the phase the persisted state
    /// implies, since hashing/session/accepted-slices all survive Pause.
    pub async fn run(&self) {
        self.intent.set(ControlIntent::Running).await;
        self.abort.set(CancelToken::new()).await;
        self.stats.start_timer().await;

        if *self.state == UploadState::Init {
            self.emit(UploadEvent::Started).await;
        }

        let abort = self.abort.get();
        let sampler = self.spawn_speed_sampler(abort.clone());

        let outcome = self.run_inner().await;
        abort.cancel();
        let _ = sampler.await;

        match outcome {
            Ok(()) => {}
            Err(Interrupt::Paused) => {
                self.state.set(UploadState::Paused).await;
                self.stats
                    .set_bytes_uploaded(hashing::SLICE_WINDOW * self.accepted_slices.len() as u64);
                self.emit(UploadEvent::Paused).await;
            }
            Err(Interrupt::Cancelled) => {
                self.state.set(UploadState::Cancelled).await;
                self.emit(UploadEvent::Cancelled).await;
            }
            Err(Interrupt::Errored(err)) => {
                warn!(task_id = self.id, error = %err, "upload failed");
                self.state.set(UploadState::Error).await;
                self.emit(UploadEvent::Error(Arc::new(err))).await;
            }
        }
    }

    fn spawn_speed_sampler(&self, abort: CancelToken) -> tokio::task::JoinHandle<()> {
        let stats = self.stats.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {
                        stats.sample_instantaneous_speed().await;
                    }
                    _ = abort.cancelled() => break,
                }
            }
        })
    }

    async fn run_inner(&self) -> PhaseResult<()> {
        let digests = self.ensure_digests().await?;

        if self.upload_session_id.is_empty()
            && self.accepted_slices.is_empty()
            && self.options.enable_rapid_upload
            && digests.rapid_upload_eligible()
        {
            if let Some(metadata) = self.try_rapid_upload(&digests).await? {
                self.state.set(UploadState::Finished).await;
                self.emit(UploadEvent::Finished {
                    success: true,
                    metadata: Some(metadata),
                })
                .await;
                return Ok(());
            }
        }

        self.state.set(UploadState::Transferring).await;
        self.check_interrupt().await?;

        if self.upload_session_id.is_empty() {
            let session_id = self.run_precreate(&digests).await?;
            self.upload_session_id.set(session_id).await;
        }

        self.run_slice_loop(&digests).await?;
        let metadata = self.run_finalize(&digests).await?;
        self.verify(&digests, &metadata).await;

        Ok(())
    }

    /// Computes and persists the file's digests, unless a previous run
    /// (before a Pause) already did so. Digests computed here are pushed
    /// forward into the injected cache so a future `TrackedFile` for the
    /// same path/mtime/size can skip hashing entirely by arriving with
    /// `known` pre-populated — this engine only ever *writes through* the
    /// cache, since consulting it requires a size the caller, not the
    /// engine, is in a position to stat ahead of time.
    async fn ensure_digests(&self) -> PhaseResult<ComputedDigests> {
        if let Some(digests) = self.digests.get() {
            return Ok(digests);
        }

        self.state.set(UploadState::Hashing).await;
        self.check_interrupt().await?;
        debug!(task_id = self.id, path = %self.file.local_path, "hashing");

        let computed = self.hash_with(self.file.known.clone()).await?;
        debug!(task_id = self.id, length = computed.content_length, "hashing complete");
        self.digests.set(Some(computed.clone())).await;
        self.stats.set_total(computed.content_length);

        if let Some(cache) = &self.digest_cache {
            cache
                .put(
                    &self.file.local_path,
                    self.file.mtime,
                    computed.content_length,
                    CachedDigests {
                        content_md5: computed.content_md5.clone(),
                        content_crc32: computed.content_crc32,
                        slice_md5: computed.slice_md5.clone(),
                    },
                )
                .await;
        }

        Ok(computed)
    }

    async fn hash_with(&self, known: KnownDigests) -> PhaseResult<ComputedDigests> {
        let reader = self
            .open_reader()
            .await
            .map_err(|e| Interrupt::Errored(UploadError::Io(e)))?;

        let abort = self.abort.get();
        let outcome = hashing::hash_file(reader, known, &abort, None)
            .await
            .map_err(|e| Interrupt::Errored(UploadError::Io(e)))?;

        match outcome {
            HashOutcome::Completed(digests) => Ok(digests),
            HashOutcome::Interrupted => Err(self.interrupt_kind()),
        }
    }

    async fn open_reader(&self) -> std::io::Result<Box<dyn AsyncFileReader>> {
        let file = tokio::fs::File::open(&self.file.local_path).await?;
        let boxed: Box<dyn AsyncFileReader> = Box::new(file);

        match &self.encryption {
            Some(filter) => filter
                .wrap(boxed)
                .await
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string())),
            None => Ok(boxed),
        }
    }

    async fn try_rapid_upload(
        &self,
        digests: &ComputedDigests,
    ) -> PhaseResult<Option<ObjectMetadata>> {
        self.check_interrupt().await?;

        let result = self
            .race(self.transport.rapid_upload(
                &self.file.remote_path,
                digests.content_length,
                &digests.content_md5,
                digests.content_crc32,
                &digests.slice_md5,
                self.options.on_duplicate,
            ))
            .await?;

        match result {
            Ok(metadata) if metadata.materialized() => {
                debug!(task_id = self.id, "rapid upload accepted");
                Ok(Some(metadata))
            }
            Ok(_) => Ok(None),
            Err(TransportError::Protocol(err)) if err.code == RAPID_UPLOAD_NOT_ELIGIBLE => {
                debug!(task_id = self.id, "rapid upload not eligible, falling back to chunked upload");
                Ok(None)
            }
            Err(other) => {
                warn!(task_id = self.id, error = %other, "rapid upload failed, falling back to chunked upload");
                self.emit(UploadEvent::Notice(format!(
                    "rapid upload failed, falling back to chunked upload: {}",
                    other
                )))
                .await;
                Ok(None)
            }
        }
    }

    async fn run_precreate(&self, digests: &ComputedDigests) -> PhaseResult<String> {
        let total_slices = slice_count(digests.content_length);
        let mut attempt: u64 = 0;

        loop {
            self.check_interrupt().await?;

            match self
                .race(self.transport.precreate(&self.file.remote_path, total_slices))
                .await?
            {
                Ok(session) => return Ok(session.upload_session_id),
                Err(TransportError::Protocol(_)) => return Err(Interrupt::Cancelled),
                Err(err) => {
                    warn!(task_id = self.id, attempt, error = %err, "precreate failed, retrying");
                    self.backoff_or_interrupt(attempt).await?;
                    attempt += 1;
                }
            }
        }
    }

    async fn run_slice_loop(&self, digests: &ComputedDigests) -> PhaseResult<()> {
        let total_slices = slice_count(digests.content_length);
        let mut reader = self
            .open_reader()
            .await
            .map_err(|e| Interrupt::Errored(UploadError::Io(e)))?;
        let session_id = self.upload_session_id.get();
        let mut attempt: u64 = 0;

        loop {
            let index = self.accepted_slices.len() as u64;
            if index >= total_slices {
                return Ok(());
            }

            self.check_interrupt().await?;

            let stats = self.stats.clone();
            let base = hashing::SLICE_WINDOW * index;
            let throttle = self.throttle.get();
            let abort = self.abort.get();

            let result = self
                .race(slice::send_slice(
                    &mut reader,
                    self.transport.as_ref(),
                    &self.file.remote_path,
                    &session_id,
                    index,
                    digests.content_length,
                    throttle,
                    &abort,
                    move |current| stats.set_bytes_uploaded(base + current),
                ))
                .await?;

            match result {
                Ok(identifier) if identifier.is_empty() => {
                    debug!(task_id = self.id, index, "slice accepted with empty identifier, retrying");
                    continue;
                }
                Ok(identifier) => {
                    debug!(task_id = self.id, index, "slice accepted");
                    self.accepted_slices.lock_write().await.push(identifier);
                    attempt = 0;
                }
                Err(TransportError::Protocol(_)) => return Err(Interrupt::Cancelled),
                Err(err) => {
                    warn!(task_id = self.id, index, attempt, error = %err, "slice transfer failed, retrying");
                    self.backoff_or_interrupt(attempt).await?;
                    attempt += 1;
                }
            }
        }
    }

    async fn run_finalize(&self, digests: &ComputedDigests) -> PhaseResult<ObjectMetadata> {
        let session_id = self.upload_session_id.get();
        let mut attempt: u64 = 0;

        loop {
            self.check_interrupt().await?;

            let identifiers = self.accepted_slices.get();
            match self
                .race(self.transport.create_super_file(
                    &self.file.remote_path,
                    &session_id,
                    &identifiers,
                    digests.content_length,
                ))
                .await?
            {
                Ok(metadata) if metadata.materialized() => return Ok(metadata),
                Ok(_) | Err(TransportError::Other(_)) => {
                    warn!(task_id = self.id, attempt, "finalize not ready yet, retrying");
                    self.backoff_or_interrupt(attempt).await?;
                    attempt += 1;
                }
                Err(TransportError::Protocol(_)) => return Err(Interrupt::Cancelled),
            }
        }
    }

    async fn verify(&self, digests: &ComputedDigests, metadata: &ObjectMetadata) {
        let md5_mismatch = !digests.content_md5.is_empty() && metadata.md5 != digests.content_md5;
        let size_mismatch = metadata.size != digests.content_length;

        if md5_mismatch || size_mismatch {
            let err = if md5_mismatch {
                UploadError::Md5Mismatch {
                    expected: digests.content_md5.clone(),
                    actual: metadata.md5.clone(),
                }
            } else {
                UploadError::SizeMismatch {
                    expected: digests.content_length,
                    actual: metadata.size,
                }
            };
            warn!(task_id = self.id, error = %err, "verification failed");
            // Emitted as a terminal completion with success=false rather
            // than a separate `Error` event; `state()` still reports
            // `Error` so a caller polling state sees the failure.
            self.state.set(UploadState::Error).await;
            self.emit(UploadEvent::Finished {
                success: false,
                metadata: Some(metadata.clone()),
            })
            .await;
            return;
        }

        self.state.set(UploadState::Finished).await;
        self.emit(UploadEvent::Finished {
            success: true,
            metadata: Some(metadata.clone()),
        })
        .await;
    }

    async fn backoff_or_interrupt(&self, attempt: u64) -> PhaseResult<()> {
        let wait = self.options.retry_strategy.wait(attempt);
        let abort = self.abort.get();

        tokio::select! {
            _ = tokio::time::sleep(wait) => Ok(()),
            _ = abort.cancelled() => self.check_interrupt().await,
        }
    }

    async fn check_interrupt(&self) -> PhaseResult<()> {
        if !self.abort.is_cancelled() {
            return Ok(());
        }

        Err(self.interrupt_kind())
    }

    fn interrupt_kind(&self) -> Interrupt {
        match *self.intent {
            ControlIntent::Pause => Interrupt::Paused,
            ControlIntent::Cancel | ControlIntent::Running => Interrupt::Cancelled,
        }
    }

    /// Races `fut` against the abort signal so a `pause`/`cancel` is
    /// promptly observable even while a transport call is in flight — the
    /// in-flight future is dropped rather than awaited to completion.
    async fn race<F, T>(&self, fut: F) -> PhaseResult<T>
    where
        F: std::future::Future<Output = T>,
    {
        let abort = self.abort.get();

        tokio::select! {
            value = fut => Ok(value),
            _ = abort.cancelled() => Err(self.interrupt_kind()),
        }
    }

    async fn emit(&self, event: UploadEvent) {
        self.on_event.call(event).await;
    }
}
