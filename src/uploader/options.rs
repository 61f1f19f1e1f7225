use typed_builder::TypedBuilder;

use crate::{
    throttle::Throttle,
    transport::OnDuplicatePolicy,
    util::{InvalidValue, IsValid, RetryStrategy},
};

/// Per-task upload options.
#[derive(Debug, TypedBuilder)]
#[builder(field_defaults(default))]
pub struct UploaderOptions {
    /// What to do when the remote already has a file at the target path.
    /// <br> Default `Overwrite`.
    pub on_duplicate: OnDuplicatePolicy,
    /// Pass the local file through the injected
    /// [`EncryptionFilter`](crate::transport::EncryptionFilter) before
    /// hashing and transfer.
    /// <br> Default `false`.
    pub encrypt: bool,
    /// Attempt the rapid-upload shortcut before falling back to chunked
    /// upload.
    /// <br> Default `true`.
    #[builder(default = true)]
    pub enable_rapid_upload: bool,
    /// Upper bound on concurrent slice transfers this task may issue. The
    /// slice loop in this engine is strictly sequential, so this
    /// exists purely as a transport-facing hint for implementations that
    /// themselves fan a single slice out over several connections.
    /// <br> Default `1`.
    #[builder(default = 1)]
    pub max_threads_per_task: usize,
    /// Backoff used between indefinite precreate/finalize retries.
    /// <br> Defaults to [`RetryStrategy::default`].
    pub retry_strategy: RetryStrategy,
    /// Per-task upload speed throttle; the pool additionally apportions a
    /// share of its own total limit on top of this.
    /// <br> Default `None`.
    pub speed_throttle: Option<Throttle<u64>>,
}

impl Default for UploaderOptions {
    fn default() -> Self {
        Self {
            on_duplicate: OnDuplicatePolicy::default(),
            encrypt: false,
            enable_rapid_upload: true,
            max_threads_per_task: 1,
            retry_strategy: RetryStrategy::default(),
            speed_throttle: None,
        }
    }
}

impl IsValid for UploaderOptions {
    fn is_valid(&self) -> Result<(), InvalidValue> {
        if self.max_threads_per_task < 1 {
            return Err(InvalidValue {
                object_name: "UploaderOptions".into(),
                value_name: "max_threads_per_task".into(),
                value_as_string: self.max_threads_per_task.to_string(),
                expected: "at least 1".into(),
            });
        }

        Ok(())
    }
}
