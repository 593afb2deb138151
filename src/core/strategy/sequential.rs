//! Single-threaded baseline.

use super::{announce_finish, announce_start, fingerprint_file, Executor, Strategy};
use crate::core::hasher::Fingerprinter;
use crate::core::pipeline::{report_skip, ProgressSink};
use crate::core::reporter::{catch_sink_panic, ResultSink};
use crate::core::types::{FileTask, RunSummary};
use crate::error::FingerprintError;
use crate::events::{Event, EventSender, PipelineEvent};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Reads, hashes and writes one file at a time on the calling thread
pub struct SequentialExecutor {
    fingerprinter: Arc<dyn Fingerprinter>,
    events: EventSender,
}

impl SequentialExecutor {
    pub fn new(fingerprinter: Arc<dyn Fingerprinter>, events: EventSender) -> Self {
        Self {
            fingerprinter,
            events,
        }
    }
}

impl Executor for SequentialExecutor {
    fn execute(
        &self,
        files: Vec<FileTask>,
        sink: Box<dyn ResultSink>,
    ) -> Result<RunSummary, FingerprintError> {
        let start_time = Instant::now();
        announce_start(&self.events, Strategy::Sequential);

        let mut sink = ProgressSink {
            inner: sink,
            events: self.events.clone(),
            completed: 0,
            total: files.len(),
        };
        let mut summary = RunSummary {
            discovered: files.len(),
            ..Default::default()
        };

        for task in files {
            let record = match fingerprint_file(self.fingerprinter.as_ref(), &task.path) {
                Ok(record) => record,
                Err(error) => {
                    debug!(path = %task.path.display(), error = %error, "Skipping file");
                    report_skip(&self.events, &task.path, &error);
                    summary.skipped += 1;
                    continue;
                }
            };
            if let Err(error) = catch_sink_panic(|| sink.write(&record)) {
                self.events.send(Event::Pipeline(PipelineEvent::Error {
                    message: error.to_string(),
                }));
                return Err(error.into());
            }
            summary.processed += 1;
        }
        catch_sink_panic(|| sink.finish())?;

        summary.duration_ms = start_time.elapsed().as_millis() as u64;
        announce_finish(&self.events, Strategy::Sequential, summary);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hasher::Xxh3Fingerprinter;
    use crate::core::reporter::MemorySink;
    use crate::events::null_sender;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn records_follow_input_order() {
        let dir = TempDir::new().unwrap();
        let files: Vec<FileTask> = ["c", "a", "b"]
            .iter()
            .map(|name| {
                let path = dir.path().join(name);
                fs::write(&path, name.as_bytes()).unwrap();
                FileTask::new(path)
            })
            .collect();

        let sink = MemorySink::new();
        let executor = SequentialExecutor::new(Arc::new(Xxh3Fingerprinter), null_sender());
        executor
            .execute(files.clone(), Box::new(sink.clone()))
            .unwrap();

        let paths: Vec<_> = sink.records().into_iter().map(|r| r.path).collect();
        let expected: Vec<_> = files.into_iter().map(|f| f.path).collect();
        assert_eq!(paths, expected);
    }
}
