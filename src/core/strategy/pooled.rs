//! One pool task per file.

use super::{
    announce_finish, announce_start, drain_to_sink, fingerprint_file, result_queue, Executor,
    Strategy,
};
use crate::core::hasher::Fingerprinter;
use crate::core::pipeline::{report_skip, AbortHandle, ProgressSink};
use crate::core::pool::WorkerPool;
use crate::core::reporter::ResultSink;
use crate::core::types::{FileTask, RunSummary};
use crate::error::{FingerprintError, PipelineError, TaskError};
use crate::events::{Event, EventSender, PipelineEvent};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, warn};

/// Submits every file to a [`WorkerPool`]; idle workers pick up the next
/// file, so one large file does not hold back a whole chunk.
pub struct PoolExecutor {
    threads: usize,
    fingerprinter: Arc<dyn Fingerprinter>,
    events: EventSender,
}

impl PoolExecutor {
    pub fn new(threads: usize, fingerprinter: Arc<dyn Fingerprinter>, events: EventSender) -> Self {
        Self {
            threads: threads.max(1),
            fingerprinter,
            events,
        }
    }
}

impl Executor for PoolExecutor {
    fn execute(
        &self,
        files: Vec<FileTask>,
        sink: Box<dyn ResultSink>,
    ) -> Result<RunSummary, FingerprintError> {
        let start_time = Instant::now();
        announce_start(&self.events, Strategy::Pool);

        let total = files.len();
        let abort = AbortHandle::new();
        let results = result_queue(&abort);
        let mut writer = ProgressSink {
            inner: sink,
            events: self.events.clone(),
            completed: 0,
            total,
        };

        let mut pool = WorkerPool::named("hash", self.threads)?;
        let failures = pool.errors();

        let written = thread::scope(|scope| -> Result<_, PipelineError> {
            let writer_thread = thread::Builder::new()
                .name("write".to_string())
                .spawn_scoped(scope, || drain_to_sink(&results, &mut writer, &abort))
                .map_err(|source| PipelineError::Spawn {
                    stage: "write".to_string(),
                    source,
                })?;

            for task in files {
                if abort.is_aborted() {
                    break;
                }
                let fingerprinter = Arc::clone(&self.fingerprinter);
                let results = Arc::clone(&results);
                let events = self.events.clone();
                let submitted = pool.submit(move || {
                    let record = fingerprint_file(fingerprinter.as_ref(), &task.path)
                        .map_err(|error| {
                            report_skip(&events, &task.path, &error);
                            TaskError::for_path(&task.path, error.to_string())
                        })?;
                    results
                        .push(record)
                        .map_err(|_| TaskError::for_path(&task.path, "run aborted"))
                });
                if submitted.is_err() {
                    break;
                }
            }

            let report = pool.shutdown(true);
            debug!(
                completed = report.completed,
                failed = report.failed,
                "Pool drained"
            );
            results.close();

            writer_thread
                .join()
                .map_err(|_| PipelineError::WorkerPanicked {
                    stage: "write".to_string(),
                })
        })?;

        let written = match written {
            Ok(written) => written,
            Err(failure) => {
                self.events.send(Event::Pipeline(PipelineEvent::Error {
                    message: failure.to_string(),
                }));
                return Err(failure.into());
            }
        };

        let skipped = failures.try_iter().count();
        if written + skipped != total {
            warn!(total, written, skipped, "Pool run lost files");
            return Err(PipelineError::WorkerPanicked {
                stage: "hash".to_string(),
            }
            .into());
        }

        let summary = RunSummary {
            discovered: total,
            processed: written,
            skipped,
            duration_ms: start_time.elapsed().as_millis() as u64,
        };
        announce_finish(&self.events, Strategy::Pool, summary);
        Ok(summary)
    }
}
