//! Cancellation handle propagated into the Attempt Engine. Wraps
//! `tokio_util::sync::CancellationToken`, whose `cancelled()` future has no
//! check-then-await gap, so a `cancel()` landing between a waiter's
//! `is_cancelled()` check and its await is never missed.

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// A handle that can be used to request cancellation of an in-flight
/// logical request. Cloning shares the same underlying token.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. The Attempt Engine checks this before issuing
    /// each attempt and races it against each retry backoff sleep.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves as soon as cancellation is requested, including if it was
    /// already requested before this call.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uncancelled_and_observes_cancel() {
        let handle = CancelHandle::new();
        assert!(!handle.is_cancelled());
        let clone = handle.clone();
        clone.cancel();
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_resolves_immediately_when_already_cancelled() {
        let handle = CancelHandle::new();
        handle.cancel();
        tokio::time::timeout(std::time::Duration::from_millis(50), handle.cancelled())
            .await
            .expect("cancelled() should resolve without waiting");
    }

    #[tokio::test]
    async fn cancelled_wakes_a_pending_waiter() {
        let handle = CancelHandle::new();
        let waiter = handle.clone();
        let task = tokio::spawn(async move { waiter.cancelled().await });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        handle.cancel();
        tokio::time::timeout(std::time::Duration::from_millis(50), task)
            .await
            .expect("task should finish")
            .unwrap();
    }
}
