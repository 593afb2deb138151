//! # Queue Module
//!
//! Blocking FIFO shared between pipeline stages.
//!
//! ## States
//! - **Open** - accepting pushes
//! - **Draining** - closed for writing, items remain
//! - **Closed** - closed and empty; `pop` returns `None` from here on
//!
//! Consumers wait on a single compound condition (`!empty || closed`), so an
//! empty-but-open queue never spins. A bounded queue blocks producers while
//! full, which caps memory when reading outpaces hashing.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Observable state of a [`WorkQueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Open,
    Draining,
    Closed,
}

/// Returned by [`WorkQueue::push`] when the queue no longer accepts items.
///
/// Carries the rejected item back to the caller.
#[derive(PartialEq, Eq)]
pub struct Closed<T>(pub T);

impl<T> fmt::Debug for Closed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Closed(..)")
    }
}

impl<T> fmt::Display for Closed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("queue is closed for writing")
    }
}

impl<T> std::error::Error for Closed<T> {}

/// Why a deadline-bounded pop returned without an item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopError {
    /// The queue is empty and closed
    Closed,
    /// The deadline passed first
    Timeout,
}

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Thread-safe FIFO with an optional capacity bound and a close signal.
pub struct WorkQueue<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: Option<usize>,
}

impl<T> WorkQueue<T> {
    /// A queue with no capacity bound; `push` never blocks.
    pub fn unbounded() -> Self {
        Self::with_capacity(None)
    }

    /// A queue holding at most `capacity` items (minimum 1).
    pub fn bounded(capacity: usize) -> Self {
        Self::with_capacity(Some(capacity.max(1)))
    }

    /// `None` means unbounded.
    pub fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity: capacity.map(|c| c.max(1)),
        }
    }

    // Queue state is consistent between operations, so a panic elsewhere
    // while holding the lock leaves nothing half-written.
    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_full(&self, inner: &Inner<T>) -> bool {
        self.capacity.is_some_and(|cap| inner.items.len() >= cap)
    }

    /// Append an item, blocking while the queue is full.
    ///
    /// Fails once the queue has been closed, including when it is closed
    /// while this call is waiting for space.
    pub fn push(&self, item: T) -> Result<(), Closed<T>> {
        let mut inner = self.lock();
        while !inner.closed && self.is_full(&inner) {
            inner = self
                .not_full
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if inner.closed {
            return Err(Closed(item));
        }
        inner.items.push_back(item);
        drop(inner);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Remove the next item, blocking until one is available.
    ///
    /// Returns `None` only when the queue is both empty and closed.
    pub fn pop(&self) -> Option<T> {
        let mut inner = self.lock();
        loop {
            if let Some(item) = inner.items.pop_front() {
                drop(inner);
                self.not_full.notify_one();
                return Some(item);
            }
            if inner.closed {
                return None;
            }
            inner = self
                .not_empty
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`pop`](Self::pop) but gives up after `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Result<T, PopError> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.lock();
        loop {
            if let Some(item) = inner.items.pop_front() {
                drop(inner);
                self.not_full.notify_one();
                return Ok(item);
            }
            if inner.closed {
                return Err(PopError::Closed);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(PopError::Timeout);
            }
            let (guard, _) = self
                .not_empty
                .wait_timeout(inner, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            inner = guard;
        }
    }

    /// Mark the queue closed for writing. Idempotent; queued items stay.
    pub fn close(&self) {
        let mut inner = self.lock();
        if inner.closed {
            return;
        }
        inner.closed = true;
        drop(inner);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn state(&self) -> QueueState {
        let inner = self.lock();
        match (inner.closed, inner.items.is_empty()) {
            (false, _) => QueueState::Open,
            (true, false) => QueueState::Draining,
            (true, true) => QueueState::Closed,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Remove every queued item without closing. Used by non-draining
    /// shutdowns to discard work that has not started.
    pub fn clear(&self) -> usize {
        let mut inner = self.lock();
        let discarded = inner.items.len();
        inner.items.clear();
        drop(inner);
        self.not_full.notify_all();
        discarded
    }
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl<T> fmt::Debug for WorkQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("WorkQueue")
            .field("len", &inner.items.len())
            .field("closed", &inner.closed)
            .field("capacity", &self.capacity)
            .finish()
    }
}
