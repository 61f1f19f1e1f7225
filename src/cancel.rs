//! Cooperative cancellation for an in-flight upload.
//!
//! A [`CancelToken`] is checked at phase boundaries and within the hashing
//! and slice-sending read loops, and a sleeping retry/backoff wakes
//! immediately rather than polling (see [`CancelToken::cancelled`]).

use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};

use tokio::sync::Notify;

#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves immediately if already cancelled; otherwise resolves the
    /// moment [`CancelToken::cancel`] is called. Useful inside
    /// `tokio::select!` alongside a retry backoff sleep.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }

        self.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelled_resolves_immediately_if_already_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        tokio::time::timeout(std::time::Duration::from_millis(50), token.cancelled())
            .await
            .expect("should not time out");
    }

    #[tokio::test]
    async fn cancelled_wakes_waiter_on_cancel() {
        let token = CancelToken::new();
        let waiter = token.clone();

        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        token.cancel();

        tokio::time::timeout(std::time::Duration::from_millis(200), handle)
            .await
            .expect("waiter should have woken")
            .unwrap();
    }
}
