//! Background task tracking with drain-on-shutdown.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Notify};

struct Inner {
    in_flight: AtomicI64,
    accepting: AtomicBool,
    drained: Notify,
    shutdown_tx: watch::Sender<bool>,
}

/// Tracks in-flight background work.
///
/// The counter increments before each task is spawned and decrements when
/// it completes; [`AsyncTaskManager::shutdown`] stops accepting new tasks
/// and blocks until the counter drains. Cancellation is cooperative: tasks
/// may watch [`AsyncTaskManager::shutdown_signal`] and finish early.
#[derive(Clone)]
pub struct AsyncTaskManager {
    inner: Arc<Inner>,
}

impl AsyncTaskManager {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                in_flight: AtomicI64::new(0),
                accepting: AtomicBool::new(true),
                drained: Notify::new(),
                shutdown_tx,
            }),
        }
    }

    /// Spawns a tracked task. Returns false (and drops the task) once
    /// shutdown has begun.
    pub fn spawn<F>(&self, task: F) -> bool
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        if !self.inner.accepting.load(Ordering::SeqCst) {
            tracing::warn!("Rejecting background task: task manager is shutting down");
            return false;
        }

        self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.clone();
        tokio::spawn(async move {
            task.await;
            if inner.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
                inner.drained.notify_waiters();
            }
        });
        true
    }

    /// Number of tasks currently in flight.
    pub fn in_flight(&self) -> i64 {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// A receiver that flips to true when shutdown begins.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.inner.shutdown_tx.subscribe()
    }

    /// Stops accepting new tasks, signals running ones, and waits for the
    /// in-flight counter to reach zero.
    pub async fn shutdown(&self) {
        self.inner.accepting.store(false, Ordering::SeqCst);
        let _ = self.inner.shutdown_tx.send(true);

        loop {
            let notified = self.inner.drained.notified();
            if self.inner.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Default for AsyncTaskManager {
    fn default() -> Self {
        Self::new()
    }
}
