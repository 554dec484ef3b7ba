//! Serialized loader — the single global construction slot
//!
//! Constructing two models at once on the same device interferes with
//! numeric precision state and can exhaust device memory, so every
//! provider — across all kinds and all managers sharing this loader —
//! runs on one dedicated worker thread, in FIFO submission order.

use std::sync::Arc;
use std::thread;

use crossbeam::channel::{self, Sender};
use tokio::sync::oneshot;

type Job = Box<dyn FnOnce() + Send>;

/// Single-worker FIFO execution queue for blocking construction work.
///
/// Shared by reference ([`Arc`]) between a primary [`Manager`] and any
/// [`Overlay`] layered on top of it, so construction stays globally
/// serialized. The worker thread exits once every handle is dropped.
///
/// [`Manager`]: crate::Manager
/// [`Overlay`]: crate::Overlay
pub struct Loader {
    tx: Sender<Job>,
}

impl Loader {
    /// Start the worker thread and return a shareable handle.
    ///
    /// # Panics
    /// Panics if the OS refuses to spawn the worker thread.
    #[must_use]
    pub fn new() -> Arc<Self> {
        let (tx, rx) = channel::unbounded::<Job>();
        thread::Builder::new()
            .name("model-loader".into())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    job();
                }
            })
            .expect("failed to spawn model-loader thread");
        Arc::new(Self { tx })
    }

    /// Queue `work` and return a receiver for its result.
    ///
    /// The job always runs to completion once queued; if the receiver is
    /// dropped, the result is discarded. The receiver yields an error only
    /// when the worker is gone (a previous job panicked).
    pub fn submit<T, F>(&self, work: F) -> oneshot::Receiver<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            let _ = tx.send(work());
        });
        let _ = self.tx.send(job);
        rx
    }
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("queued", &self.tx.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn submit_delivers_result() {
        let loader = Loader::new();
        let rx = loader.submit(|| 21 * 2);
        assert_eq!(rx.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn jobs_run_in_submission_order() {
        let loader = Loader::new();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let mut receivers = Vec::new();
        for i in 0..8 {
            let order = order.clone();
            receivers.push(loader.submit(move || order.lock().push(i)));
        }
        for rx in receivers {
            rx.await.unwrap();
        }

        assert_eq!(*order.lock(), (0..8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn jobs_never_overlap() {
        let loader = Loader::new();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));

        let mut receivers = Vec::new();
        for _ in 0..4 {
            let in_flight = in_flight.clone();
            let max_in_flight = max_in_flight.clone();
            receivers.push(loader.submit(move || {
                let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_in_flight.fetch_max(current, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(10));
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for rx in receivers {
            rx.await.unwrap();
        }

        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropped_receiver_does_not_wedge_the_worker() {
        let loader = Loader::new();
        drop(loader.submit(|| {
            thread::sleep(Duration::from_millis(10));
            1
        }));
        let rx = loader.submit(|| 2);
        assert_eq!(rx.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn panicking_job_kills_the_worker() {
        let loader = Loader::new();
        let rx = loader.submit(|| -> u32 { panic!("provider exploded") });
        assert!(rx.await.is_err());

        // Worker is gone; later submissions fail instead of hanging.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let rx = loader.submit(|| 1);
        assert!(rx.await.is_err());
    }
}
