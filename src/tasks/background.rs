//! Detached Background Tasks
//!
//! Fire-and-forget work spawned on behalf of a caller that does not wait for it:
//! cache write-back after a miss and invalidation after a write.
//!
//! # Delivery
//! There is no delivery guarantee. A task runs to completion or failure on its
//! own, is never cancelled by the caller that triggered it, and its failure is
//! only logged. Without a tokio runtime the task is dropped with a warning.

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::error::Result;

#[derive(Debug, Default)]
struct Inner {
    in_flight: AtomicUsize,
    spawned: AtomicU64,
    failed: AtomicU64,
    idle: Notify,
}

// == Background Tasks ==
/// Cloneable spawner; all clones share the same counters.
#[derive(Debug, Clone, Default)]
pub struct BackgroundTasks {
    inner: Arc<Inner>,
}

/// Decrements the in-flight count even if the task panics.
struct InFlightGuard(Arc<Inner>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `task` detached from the caller.
    ///
    /// `name` identifies the task in logs. Returns false if no runtime was
    /// available and the task was dropped.
    pub fn spawn<F>(&self, name: &'static str, task: F) -> bool
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let Ok(handle) = Handle::try_current() else {
            warn!(task = name, "No async runtime available, background task dropped");
            return false;
        };

        self.inner.in_flight.fetch_add(1, Ordering::AcqRel);
        self.inner.spawned.fetch_add(1, Ordering::Relaxed);
        let guard = InFlightGuard(self.inner.clone());

        handle.spawn(async move {
            match task.await {
                Ok(()) => debug!(task = name, "Background task finished"),
                Err(err) => {
                    guard.0.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(task = name, error = %err, "Background task failed");
                }
            }
        });
        true
    }

    /// Waits until no spawned task is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.inner.in_flight.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Tasks currently running.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Tasks spawned since creation.
    pub fn spawned(&self) -> u64 {
        self.inner.spawned.load(Ordering::Relaxed)
    }

    /// Tasks that finished with an error.
    pub fn failed(&self) -> u64 {
        self.inner.failed.load(Ordering::Relaxed)
    }
}
