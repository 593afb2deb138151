//! # Pool Module
//!
//! Fixed-size group of worker threads pulling tasks from one [`WorkQueue`].
//!
//! ## Failure isolation
//! A task that returns `Err` or panics is reported on the pool's error
//! channel and counted as failed. The worker that ran it keeps going.
//!
//! ## Shutdown
//! - `shutdown(true)` - finish every queued task, then join
//! - `shutdown(false)` - discard tasks not yet started, then join
//!
//! Dropping a pool that was never shut down performs a draining shutdown.

use crate::core::queue::WorkQueue;
use crate::error::{PoolError, TaskError};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::any::Any;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// A unit of work executed by the pool
pub type Task = Box<dyn FnOnce() -> Result<(), TaskError> + Send + 'static>;

/// Number of hardware threads, never less than 1
pub fn default_parallelism() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Outcome counts reported by [`WorkerPool::shutdown`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolReport {
    pub completed: usize,
    pub failed: usize,
    pub discarded: usize,
}

#[derive(Default)]
struct Counters {
    completed: AtomicUsize,
    failed: AtomicUsize,
}

/// Fixed-size worker pool
pub struct WorkerPool {
    name: String,
    queue: Arc<WorkQueue<Task>>,
    workers: Vec<JoinHandle<()>>,
    counters: Arc<Counters>,
    errors: Receiver<TaskError>,
    discarded: usize,
}

impl WorkerPool {
    /// Start a pool with `workers` threads (minimum 1)
    pub fn new(workers: usize) -> Result<Self, PoolError> {
        Self::named("pool", workers)
    }

    /// Start a pool sized to the available hardware parallelism
    pub fn with_default_size() -> Result<Self, PoolError> {
        Self::new(default_parallelism())
    }

    /// Start a pool whose threads are named `<name>-<index>`
    pub fn named(name: impl Into<String>, workers: usize) -> Result<Self, PoolError> {
        let name = name.into();
        let queue: Arc<WorkQueue<Task>> = Arc::new(WorkQueue::unbounded());
        let counters = Arc::new(Counters::default());
        let (error_tx, error_rx) = unbounded();

        let mut pool = Self {
            name,
            queue,
            workers: Vec::new(),
            counters,
            errors: error_rx,
            discarded: 0,
        };

        for index in 0..workers.max(1) {
            let queue = Arc::clone(&pool.queue);
            let counters = Arc::clone(&pool.counters);
            let errors = error_tx.clone();
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", pool.name, index))
                .spawn(move || worker_loop(&queue, &counters, &errors));

            match spawned {
                Ok(handle) => pool.workers.push(handle),
                Err(e) => {
                    pool.shutdown(false);
                    return Err(PoolError::Spawn(e));
                }
            }
        }

        debug!(pool = %pool.name, workers = pool.workers.len(), "Worker pool started");
        Ok(pool)
    }

    /// Number of worker threads
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Tasks waiting for a free worker
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Receiver for task failures. Every failure is delivered exactly once
    /// across all clones of the receiver.
    pub fn errors(&self) -> Receiver<TaskError> {
        self.errors.clone()
    }

    /// Enqueue a task. Rejected once shutdown has begun.
    pub fn submit<F>(&self, task: F) -> Result<(), PoolError>
    where
        F: FnOnce() -> Result<(), TaskError> + Send + 'static,
    {
        self.queue
            .push(Box::new(task))
            .map_err(|_| PoolError::ShutDown)
    }

    /// Stop accepting tasks and join every worker.
    ///
    /// With `drain` the call returns after all queued tasks ran. Without it,
    /// tasks that have not started are dropped and counted as discarded.
    /// Calling this more than once is harmless.
    pub fn shutdown(&mut self, drain: bool) -> PoolReport {
        self.queue.close();
        if !drain {
            self.discarded += self.queue.clear();
        }

        for handle in self.workers.drain(..) {
            // Task panics are caught inside the loop; a join error here means
            // the loop itself failed, which leaves nothing to recover.
            if handle.join().is_err() {
                warn!(pool = %self.name, "Worker thread exited abnormally");
            }
        }

        let report = self.report();
        debug!(
            pool = %self.name,
            completed = report.completed,
            failed = report.failed,
            discarded = report.discarded,
            "Worker pool stopped"
        );
        report
    }

    /// Counts so far
    pub fn report(&self) -> PoolReport {
        PoolReport {
            completed: self.counters.completed.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
            discarded: self.discarded,
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.shutdown(true);
        }
    }
}

fn worker_loop(queue: &WorkQueue<Task>, counters: &Counters, errors: &Sender<TaskError>) {
    while let Some(task) = queue.pop() {
        let failure = match panic::catch_unwind(AssertUnwindSafe(task)) {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(payload) => Some(TaskError::new(format!(
                "task panicked: {}",
                panic_message(payload.as_ref())
            ))),
        };

        match failure {
            None => {
                counters.completed.fetch_add(1, Ordering::SeqCst);
            }
            Some(error) => {
                counters.failed.fetch_add(1, Ordering::SeqCst);
                warn!(error = %error, path = ?error.path, "Pool task failed");
                // Nobody listening is fine; the failure is already counted.
                let _ = errors.send(error);
            }
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn drained_shutdown_runs_every_task() {
        let mut pool = WorkerPool::new(4).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..100 {
            let counter = Arc::clone(&counter);
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        }

        let report = pool.shutdown(true);
        assert_eq!(counter.load(Ordering::SeqCst), 100);
        assert_eq!(report.completed, 100);
        assert_eq!(report.discarded, 0);
    }

    #[test]
    fn failing_task_does_not_stop_other_tasks() {
        let mut pool = WorkerPool::new(1).unwrap();
        let errors = pool.errors();
        let counter = Arc::new(AtomicUsize::new(0));

        pool.submit(|| Err(TaskError::for_path("/data/bad", "unreadable")))
            .unwrap();
        for _ in 0..5 {
            let counter = Arc::clone(&counter);
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        }

        let report = pool.shutdown(true);
        assert_eq!(report.failed, 1);
        assert_eq!(report.completed, 5);
        assert_eq!(counter.load(Ordering::SeqCst), 5);

        let error = errors.try_recv().unwrap();
        assert_eq!(error.message, "unreadable");
    }

    #[test]
    fn panicking_task_is_reported_not_fatal() {
        let mut pool = WorkerPool::new(1).unwrap();
        let errors = pool.errors();

        pool.submit(|| panic!("boom")).unwrap();
        pool.submit(|| Ok(())).unwrap();

        let report = pool.shutdown(true);
        assert_eq!(report.failed, 1);
        assert_eq!(report.completed, 1);
        assert!(errors.try_recv().unwrap().message.contains("boom"));
    }

    #[test]
    fn non_draining_shutdown_discards_pending_tasks() {
        let mut pool = WorkerPool::new(1).unwrap();
        let (started_tx, started_rx) = crossbeam_channel::bounded(1);
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(1);

        pool.submit(move || {
            started_tx.send(()).ok();
            release_rx.recv_timeout(Duration::from_secs(5)).ok();
            Ok(())
        })
        .unwrap();
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        for _ in 0..10 {
            pool.submit(|| Ok(())).unwrap();
        }

        let releaser = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            release_tx.send(()).ok();
        });
        let report = pool.shutdown(false);
        releaser.join().unwrap();

        assert_eq!(report.completed, 1);
        assert_eq!(report.discarded, 10);
    }

    #[test]
    fn submit_after_shutdown_is_rejected() {
        let mut pool = WorkerPool::new(2).unwrap();
        pool.shutdown(true);
        assert!(matches!(pool.submit(|| Ok(())), Err(PoolError::ShutDown)));
    }

    #[test]
    fn shutdown_is_idempotent() {
        let mut pool = WorkerPool::new(2).unwrap();
        pool.submit(|| Ok(())).unwrap();
        let first = pool.shutdown(true);
        let second = pool.shutdown(true);
        assert_eq!(first, second);
    }

    #[test]
    fn zero_workers_is_raised_to_one() {
        let pool = WorkerPool::new(0).unwrap();
        assert_eq!(pool.size(), 1);
    }

    #[test]
    fn default_parallelism_is_at_least_one() {
        assert!(default_parallelism() >= 1);
    }
}
