//! Cancellable deferred work
//!
//! A [`DelayedTask`] runs a future after a fixed delay unless cancelled
//! first. Cancellation only prevents *firing*: once the delay has elapsed
//! and the body has started, the body's own locking discipline is the
//! tie-breaker (the manager's eviction body re-checks entry state under
//! the entry lock before acting).

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Handle to a unit of deferred work scheduled on the tokio runtime.
///
/// Dropping the handle cancels the task, so storing it in an `Option`
/// and replacing it never leaks a live timer.
pub struct DelayedTask {
    cancel: CancellationToken,
}

impl DelayedTask {
    /// Schedule `work` to run after `delay` unless cancelled first.
    ///
    /// Must be called within a tokio runtime context.
    pub fn spawn<F>(delay: Duration, work: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let _ = tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }
            work.await;
        });
        Self { cancel }
    }

    /// Cancel the task. A no-op if it already fired or was cancelled.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether `cancel` has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for DelayedTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for DelayedTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelayedTask")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn fires_after_delay() {
        let fired = Arc::new(AtomicBool::new(false));
        let fired_c = fired.clone();
        let task = DelayedTask::spawn(Duration::from_millis(20), async move {
            fired_c.store(true, Ordering::SeqCst);
        });
        assert!(!fired.load(Ordering::SeqCst));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(fired.load(Ordering::SeqCst));
        drop(task);
    }

    #[tokio::test]
    async fn cancel_prevents_firing() {
        let fired = Arc::new(AtomicBool::new(false));
        let fired_c = fired.clone();
        let task = DelayedTask::spawn(Duration::from_millis(20), async move {
            fired_c.store(true, Ordering::SeqCst);
        });
        task.cancel();
        assert!(task.is_cancelled());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn drop_cancels() {
        let fired = Arc::new(AtomicBool::new(false));
        let fired_c = fired.clone();
        drop(DelayedTask::spawn(Duration::from_millis(20), async move {
            fired_c.store(true, Ordering::SeqCst);
        }));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cancel_after_fire_is_noop() {
        let fired = Arc::new(AtomicBool::new(false));
        let fired_c = fired.clone();
        let task = DelayedTask::spawn(Duration::from_millis(10), async move {
            fired_c.store(true, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(fired.load(Ordering::SeqCst));
        task.cancel();
        assert!(fired.load(Ordering::SeqCst));
    }
}
