//! Fixed chunking: the file list is split once, one thread per chunk.

use super::{
    announce_finish, announce_start, drain_to_sink, fingerprint_file, result_queue, Executor,
    Strategy,
};
use crate::core::hasher::Fingerprinter;
use crate::core::pipeline::{report_skip, AbortHandle, ProgressSink};
use crate::core::queue::WorkQueue;
use crate::core::reporter::ResultSink;
use crate::core::types::{FileTask, ResultRecord, RunSummary};
use crate::error::{FingerprintError, PipelineError};
use crate::events::{Event, EventSender, PipelineEvent};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::debug;

/// Splits the files into `threads` contiguous chunks and hashes each chunk
/// on its own scoped thread. A single writer thread owns the sink.
pub struct ThreadedExecutor {
    threads: usize,
    fingerprinter: Arc<dyn Fingerprinter>,
    events: EventSender,
}

impl ThreadedExecutor {
    pub fn new(threads: usize, fingerprinter: Arc<dyn Fingerprinter>, events: EventSender) -> Self {
        Self {
            threads: threads.max(1),
            fingerprinter,
            events,
        }
    }
}

struct ChunkOutcome {
    skipped: usize,
    panicked: bool,
}

impl Executor for ThreadedExecutor {
    fn execute(
        &self,
        files: Vec<FileTask>,
        sink: Box<dyn ResultSink>,
    ) -> Result<RunSummary, FingerprintError> {
        let start_time = Instant::now();
        announce_start(&self.events, Strategy::Threaded);

        let total = files.len();
        let abort = AbortHandle::new();
        let results = result_queue(&abort);
        let mut writer = ProgressSink {
            inner: sink,
            events: self.events.clone(),
            completed: 0,
            total,
        };
        let chunk_size = total.div_ceil(self.threads).max(1);

        let (outcome, written) = thread::scope(|scope| -> Result<_, PipelineError> {
            let writer_thread = thread::Builder::new()
                .name("write".to_string())
                .spawn_scoped(scope, || drain_to_sink(&results, &mut writer, &abort))
                .map_err(|source| PipelineError::Spawn {
                    stage: "write".to_string(),
                    source,
                })?;

            let mut workers = Vec::new();
            for (index, chunk) in files.chunks(chunk_size).enumerate() {
                let results = &results;
                let fingerprinter = self.fingerprinter.as_ref();
                let events = &self.events;
                let spawned = thread::Builder::new()
                    .name(format!("hash-{index}"))
                    .spawn_scoped(scope, move || {
                        hash_chunk(chunk, fingerprinter, results, events)
                    });
                match spawned {
                    Ok(handle) => workers.push(handle),
                    Err(source) => {
                        // Wakes the writer so the scope can end.
                        abort.abort();
                        return Err(PipelineError::Spawn {
                            stage: "hash".to_string(),
                            source,
                        });
                    }
                }
            }
            debug!(threads = workers.len(), chunk_size, "Chunk workers started");

            let mut outcome = ChunkOutcome {
                skipped: 0,
                panicked: false,
            };
            for worker in workers {
                match worker.join() {
                    Ok(skipped) => outcome.skipped += skipped,
                    Err(_) => {
                        outcome.panicked = true;
                        abort.abort();
                    }
                }
            }
            results.close();

            let written = writer_thread.join().map_err(|_| PipelineError::WorkerPanicked {
                stage: "write".to_string(),
            })?;
            Ok((outcome, written))
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
        if outcome.panicked {
            return Err(PipelineError::WorkerPanicked {
                stage: "hash".to_string(),
            }
            .into());
        }

        let summary = RunSummary {
            discovered: total,
            processed: written,
            skipped: outcome.skipped,
            duration_ms: start_time.elapsed().as_millis() as u64,
        };
        announce_finish(&self.events, Strategy::Threaded, summary);
        Ok(summary)
    }
}

/// Hash every file in `chunk`, pushing records as they complete. Returns
/// the number of files skipped.
fn hash_chunk(
    chunk: &[FileTask],
    fingerprinter: &dyn Fingerprinter,
    results: &WorkQueue<ResultRecord>,
    events: &EventSender,
) -> usize {
    let mut skipped = 0;
    for task in chunk {
        match fingerprint_file(fingerprinter, &task.path) {
            Ok(record) => {
                if results.push(record).is_err() {
                    // Writer failed; the run is over.
                    break;
                }
            }
            Err(error) => {
                debug!(path = %task.path.display(), error = %error, "Skipping file");
                report_skip(events, &task.path, &error);
                skipped += 1;
            }
        }
    }
    skipped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hasher::Xxh3Fingerprinter;
    use crate::core::reporter::MemorySink;
    use crate::error::WriteError;
    use crate::events::null_sender;
    use std::fs;
    use tempfile::TempDir;

    struct BrokenSink;

    impl ResultSink for BrokenSink {
        fn write(&mut self, record: &ResultRecord) -> Result<(), WriteError> {
            Err(WriteError::Write {
                path: record.path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "read-only"),
            })
        }
    }

    fn files(dir: &TempDir, count: usize) -> Vec<FileTask> {
        (0..count)
            .map(|i| {
                let path = dir.path().join(format!("{i}.bin"));
                fs::write(&path, i.to_le_bytes()).unwrap();
                FileTask::new(path)
            })
            .collect()
    }

    #[test]
    fn more_threads_than_files() {
        let dir = TempDir::new().unwrap();
        let sink = MemorySink::new();

        let summary = ThreadedExecutor::new(16, Arc::new(Xxh3Fingerprinter), null_sender())
            .execute(files(&dir, 3), Box::new(sink.clone()))
            .unwrap();

        assert_eq!(summary.processed, 3);
        assert_eq!(sink.records().len(), 3);
    }

    #[test]
    fn uneven_chunks_cover_every_file() {
        let dir = TempDir::new().unwrap();
        let sink = MemorySink::new();

        let summary = ThreadedExecutor::new(4, Arc::new(Xxh3Fingerprinter), null_sender())
            .execute(files(&dir, 11), Box::new(sink.clone()))
            .unwrap();

        assert_eq!(summary.discovered, 11);
        assert_eq!(summary.processed, 11);
    }

    #[test]
    fn writer_failure_is_returned() {
        let dir = TempDir::new().unwrap();

        let result = ThreadedExecutor::new(2, Arc::new(Xxh3Fingerprinter), null_sender())
            .execute(files(&dir, 600), Box::new(BrokenSink));

        assert!(matches!(
            result,
            Err(FingerprintError::Write(WriteError::Write { .. }))
        ));
    }
}
