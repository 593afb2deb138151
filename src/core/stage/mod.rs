//! # Stage Module
//!
//! One named step of a pipeline: an input queue, a group of workers running
//! a per-item transform, and either a downstream queue or a terminal sink.
//!
//! ## Lifecycle
//! `Created` → `Running` → `Draining` (input closed, items remain in flight)
//! → `Stopped` (every worker exited and the output was closed).
//!
//! ## Close propagation
//! The output queue is closed by the *last* worker to exit, tracked with an
//! exit counter. Each worker only exits after its input returned the closed
//! sentinel, so downstream never sees end-of-input while this stage still
//! has work in flight.

use crate::core::pipeline::AbortHandle;
use crate::core::queue::WorkQueue;
use crate::core::reporter::{catch_sink_panic, ResultSink};
use crate::core::types::ResultRecord;
use crate::error::{FingerprintError, PipelineError, WriteError};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, warn};

/// Result of transforming one item
#[derive(Debug)]
pub enum StageOutcome<T> {
    /// Pass the value downstream
    Emit(T),
    /// Drop the item; counted as skipped
    Skip(FingerprintError),
}

/// Lifecycle of a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Created,
    Running,
    Draining,
    Stopped,
}

/// Terminal consumer for a stage's output.
///
/// Always driven by exactly one worker, so implementations need no locking.
pub trait Sink<T>: Send {
    /// Persist one item
    fn accept(&mut self, item: T) -> Result<(), WriteError>;

    /// Flush everything accepted so far. Called once when the stage stops.
    fn finish(&mut self) -> Result<(), WriteError>;
}

impl<S: ResultSink + ?Sized> Sink<ResultRecord> for S {
    fn accept(&mut self, item: ResultRecord) -> Result<(), WriteError> {
        self.write(&item)
    }

    fn finish(&mut self) -> Result<(), WriteError> {
        ResultSink::finish(self)
    }
}

/// Where a stage sends its results
pub enum StageOutput<T> {
    Queue(Arc<WorkQueue<T>>),
    Sink(Box<dyn Sink<T>>),
}

/// Per-stage counts, final once the stage has stopped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageReport {
    /// Items taken from the input queue
    pub processed: usize,
    /// Items handed to the output
    pub emitted: usize,
    /// Items dropped by the transform
    pub skipped: usize,
}

type Transform<In, Out> = Arc<dyn Fn(In) -> StageOutcome<Out> + Send + Sync>;

struct StageShared {
    name: String,
    status: Mutex<StageStatus>,
    remaining: AtomicUsize,
    processed: AtomicUsize,
    emitted: AtomicUsize,
    skipped: AtomicUsize,
    failure: Mutex<Option<WriteError>>,
}

impl StageShared {
    fn set_status(&self, status: StageStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }

    fn status(&self) -> StageStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_failure(&self, failure: WriteError) {
        let mut slot = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(failure);
        }
    }
}

/// Closes the output when the last worker leaves, even if a worker unwinds.
/// A worker that unwinds also aborts the run, so no neighbour stays blocked
/// on a queue it was feeding.
struct ExitGuard<Out> {
    shared: Arc<StageShared>,
    output: Option<Arc<WorkQueue<Out>>>,
    abort: AbortHandle,
}

impl<Out> Drop for ExitGuard<Out> {
    fn drop(&mut self) {
        if thread::panicking() {
            error!(stage = %self.shared.name, "Worker unwound, aborting run");
            self.abort.abort();
        }
        if self.shared.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
            if let Some(output) = &self.output {
                output.close();
            }
            self.shared.set_status(StageStatus::Stopped);
            debug!(stage = %self.shared.name, "Last worker exited, output closed");
        }
    }
}

/// A named pipeline step
pub struct PipelineStage<In, Out> {
    shared: Arc<StageShared>,
    input: Arc<WorkQueue<In>>,
    output: Option<StageOutput<Out>>,
    transform: Transform<In, Out>,
    workers: usize,
    abort: AbortHandle,
    handles: Vec<JoinHandle<()>>,
}

impl<In, Out> PipelineStage<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    /// Create a stage with one worker. Nothing runs until [`start`](Self::start).
    pub fn new<F>(
        name: impl Into<String>,
        input: Arc<WorkQueue<In>>,
        output: StageOutput<Out>,
        transform: F,
    ) -> Self
    where
        F: Fn(In) -> StageOutcome<Out> + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(StageShared {
                name: name.into(),
                status: Mutex::new(StageStatus::Created),
                remaining: AtomicUsize::new(0),
                processed: AtomicUsize::new(0),
                emitted: AtomicUsize::new(0),
                skipped: AtomicUsize::new(0),
                failure: Mutex::new(None),
            }),
            input,
            output: Some(output),
            transform: Arc::new(transform),
            workers: 1,
            abort: AbortHandle::new(),
            handles: Vec::new(),
        }
    }

    /// Number of worker threads (minimum 1). A sink output always runs on
    /// a single worker regardless of this setting.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Share an abort signal with the rest of the run
    pub fn abort_handle(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn status(&self) -> StageStatus {
        match self.shared.status() {
            StageStatus::Running if self.input.is_closed() => StageStatus::Draining,
            status => status,
        }
    }

    /// Spawn the workers. Calling `start` twice does nothing the second time.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        let Some(output) = self.output.take() else {
            return Ok(());
        };

        match output {
            StageOutput::Queue(queue) => self.start_workers(queue),
            StageOutput::Sink(sink) => self.start_sink(sink),
        }
    }

    fn start_workers(&mut self, output: Arc<WorkQueue<Out>>) -> Result<(), PipelineError> {
        let planned = self.workers;
        self.shared.remaining.store(planned, Ordering::SeqCst);
        self.shared.set_status(StageStatus::Running);

        for index in 0..planned {
            let guard = ExitGuard {
                shared: Arc::clone(&self.shared),
                output: Some(Arc::clone(&output)),
                abort: self.abort.clone(),
            };
            let input = Arc::clone(&self.input);
            let downstream = Arc::clone(&output);
            let transform = Arc::clone(&self.transform);
            let abort = self.abort.clone();

            let spawned = thread::Builder::new()
                .name(format!("{}-{}", self.shared.name, index))
                .spawn(move || {
                    let guard = guard;
                    run_worker(&guard.shared, &input, &abort, &*transform, |out| {
                        downstream.push(out).is_ok()
                    });
                });

            match spawned {
                Ok(handle) => self.handles.push(handle),
                Err(source) => {
                    // This worker's guard was dropped with the closure; the
                    // workers never spawned still hold a share of the counter.
                    self.release_unspawned(planned - index - 1, Some(&output));
                    self.abort.abort();
                    return Err(PipelineError::Spawn {
                        stage: self.shared.name.clone(),
                        source,
                    });
                }
            }
        }

        debug!(stage = %self.shared.name, workers = planned, "Stage started");
        Ok(())
    }

    fn start_sink(&mut self, mut sink: Box<dyn Sink<Out>>) -> Result<(), PipelineError> {
        self.shared.remaining.store(1, Ordering::SeqCst);
        self.shared.set_status(StageStatus::Running);

        let guard: ExitGuard<Out> = ExitGuard {
            shared: Arc::clone(&self.shared),
            output: None,
            abort: self.abort.clone(),
        };
        let input = Arc::clone(&self.input);
        let transform = Arc::clone(&self.transform);
        let abort = self.abort.clone();

        let spawned = thread::Builder::new()
            .name(self.shared.name.clone())
            .spawn(move || {
                let guard = guard;
                let shared = Arc::clone(&guard.shared);
                run_worker(&shared, &input, &abort, &*transform, |out| {
                    match catch_sink_panic(|| sink.accept(out)) {
                        Ok(()) => true,
                        Err(e) => {
                            error!(stage = %shared.name, error = %e, "Sink failed, aborting run");
                            shared.record_failure(e);
                            abort.abort();
                            false
                        }
                    }
                });
                if let Err(e) = catch_sink_panic(|| Sink::finish(sink.as_mut())) {
                    error!(stage = %shared.name, error = %e, "Sink failed to flush");
                    shared.record_failure(e);
                    abort.abort();
                }
            });

        match spawned {
            Ok(handle) => {
                self.handles.push(handle);
                debug!(stage = %self.shared.name, "Sink stage started");
                Ok(())
            }
            Err(source) => {
                self.abort.abort();
                Err(PipelineError::Spawn {
                    stage: self.shared.name.clone(),
                    source,
                })
            }
        }
    }

    fn release_unspawned(&self, count: usize, output: Option<&Arc<WorkQueue<Out>>>) {
        if count == 0 {
            return;
        }
        if self.shared.remaining.fetch_sub(count, Ordering::SeqCst) == count {
            if let Some(output) = output {
                output.close();
            }
            self.shared.set_status(StageStatus::Stopped);
        }
    }

    /// Wait for every worker to exit and return the final counts.
    pub fn join(&mut self) -> Result<StageReport, PipelineError> {
        let mut panicked = false;
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                panicked = true;
            }
        }
        if panicked {
            return Err(PipelineError::WorkerPanicked {
                stage: self.shared.name.clone(),
            });
        }
        Ok(self.report())
    }

    /// Counts so far
    pub fn report(&self) -> StageReport {
        StageReport {
            processed: self.shared.processed.load(Ordering::SeqCst),
            emitted: self.shared.emitted.load(Ordering::SeqCst),
            skipped: self.shared.skipped.load(Ordering::SeqCst),
        }
    }

    /// The sink failure that ended the run, if any
    pub fn take_failure(&self) -> Option<WriteError> {
        self.shared
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl<In, Out> Drop for PipelineStage<In, Out> {
    fn drop(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        // Dropped without a join: stop the run so no worker blocks forever.
        self.abort.abort();
        self.input.close();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn run_worker<In, Out>(
    shared: &StageShared,
    input: &WorkQueue<In>,
    abort: &AbortHandle,
    transform: &(dyn Fn(In) -> StageOutcome<Out> + Send + Sync),
    mut deliver: impl FnMut(Out) -> bool,
) {
    while !abort.is_aborted() {
        let Some(item) = input.pop() else {
            break;
        };
        shared.processed.fetch_add(1, Ordering::SeqCst);

        match panic::catch_unwind(AssertUnwindSafe(|| transform(item))) {
            Ok(StageOutcome::Emit(out)) => {
                if !deliver(out) {
                    break;
                }
                shared.emitted.fetch_add(1, Ordering::SeqCst);
            }
            Ok(StageOutcome::Skip(reason)) => {
                shared.skipped.fetch_add(1, Ordering::SeqCst);
                warn!(stage = %shared.name, reason = %reason, "Item skipped");
            }
            Err(_) => {
                shared.skipped.fetch_add(1, Ordering::SeqCst);
                warn!(stage = %shared.name, "Transform panicked, item skipped");
            }
        }
    }
}
