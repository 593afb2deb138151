//! Run-wide abort signal.

use crate::core::queue::WorkQueue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

trait Closeable: Send + Sync {
    fn close_for_writing(&self);
}

impl<T: Send> Closeable for WorkQueue<T> {
    fn close_for_writing(&self) {
        self.close();
    }
}

type QueueKey = usize;

fn queue_key<T>(queue: &Arc<WorkQueue<T>>) -> QueueKey {
    Arc::as_ptr(queue) as *const () as QueueKey
}

#[derive(Default)]
struct AbortState {
    aborted: AtomicBool,
    queues: Mutex<Vec<(QueueKey, Arc<dyn Closeable>)>>,
}

/// Cloneable handle that stops a run.
///
/// `abort()` closes every watched queue for writing. Items already being
/// processed finish; workers take no new items and new pushes fail.
#[derive(Clone, Default)]
pub struct AbortHandle {
    inner: Arc<AbortState>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close `queue` when the run is aborted. Closes it at once if the run
    /// was already aborted.
    pub fn watch<T: Send + 'static>(&self, queue: &Arc<WorkQueue<T>>) {
        let key = queue_key(queue);
        let queue: Arc<dyn Closeable> = Arc::clone(queue) as Arc<dyn Closeable>;
        let mut queues = self
            .inner
            .queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.is_aborted() {
            queue.close_for_writing();
        }
        queues.push((key, queue));
    }

    /// Like [`watch`](Self::watch), but the queue is released again when the
    /// returned guard drops. Used for queues that only live for one run of a
    /// long-lived owner.
    pub fn watch_scoped<T: Send + 'static>(&self, queue: &Arc<WorkQueue<T>>) -> WatchGuard {
        self.watch(queue);
        WatchGuard {
            handle: self.clone(),
            key: queue_key(queue),
        }
    }

    /// Number of queues currently watched
    pub fn watched(&self) -> usize {
        self.inner
            .queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn release(&self, key: QueueKey) {
        let mut queues = self
            .inner
            .queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(index) = queues.iter().position(|(watched, _)| *watched == key) {
            queues.swap_remove(index);
        }
    }

    /// Signal the abort. Idempotent.
    pub fn abort(&self) {
        if self.inner.aborted.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Aborting run, closing all queues");

        let queues = self
            .inner
            .queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for (_, queue) in queues.iter() {
            queue.close_for_writing();
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::SeqCst)
    }
}

/// Stops watching a queue when dropped
#[must_use = "the queue is released as soon as the guard drops"]
pub struct WatchGuard {
    handle: AbortHandle,
    key: QueueKey,
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        self.handle.release(self.key);
    }
}

impl std::fmt::Debug for AbortHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbortHandle")
            .field("aborted", &self.is_aborted())
            .finish()
    }
}
