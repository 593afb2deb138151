//! Staged pipeline execution.

use super::AbortHandle;
use crate::core::hasher::{digest_for, Fingerprinter, Xxh3Fingerprinter};
use crate::core::pool::default_parallelism;
use crate::core::queue::WorkQueue;
use crate::core::reporter::ResultSink;
use crate::core::stage::{PipelineStage, Sink, StageOutcome, StageOutput};
use crate::core::types::{ContentTask, FileTask, ResultRecord, RunSummary};
use crate::error::{FingerprintError, PipelineError, ReadError, WriteError};
use crate::events::{
    null_sender, Event, EventSender, FileEvent, PipelineEvent, RunPhase, WriteProgress,
};
use std::fs;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Default bound for each inter-stage queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Configuration for the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Workers in the read stage (I/O bound)
    pub read_workers: usize,
    /// Workers in the hash stage (CPU bound)
    pub hash_workers: usize,
    /// Bound for each inter-stage queue (None = unbounded)
    pub queue_capacity: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            read_workers: 1,
            // One core each for the reader and the writer.
            hash_workers: default_parallelism().saturating_sub(2).max(1),
            queue_capacity: Some(DEFAULT_QUEUE_CAPACITY),
        }
    }
}

/// Builder for pipeline configuration
pub struct PipelineBuilder {
    config: PipelineConfig,
    fingerprinter: Option<Arc<dyn Fingerprinter>>,
    events: Option<EventSender>,
}

impl PipelineBuilder {
    /// Create a new pipeline builder
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            fingerprinter: None,
            events: None,
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the read stage width
    pub fn read_workers(mut self, workers: usize) -> Self {
        self.config.read_workers = workers.max(1);
        self
    }

    /// Set the hash stage width
    pub fn hash_workers(mut self, workers: usize) -> Self {
        self.config.hash_workers = workers.max(1);
        self
    }

    /// Bound the inter-stage queues
    pub fn queue_capacity(mut self, capacity: Option<usize>) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Set the fingerprint function
    pub fn fingerprinter(mut self, fingerprinter: Arc<dyn Fingerprinter>) -> Self {
        self.fingerprinter = Some(fingerprinter);
        self
    }

    /// Report progress on this sender
    pub fn events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Build the pipeline
    pub fn build(self) -> Pipeline {
        Pipeline {
            config: self.config,
            fingerprinter: self
                .fingerprinter
                .unwrap_or_else(|| Arc::new(Xxh3Fingerprinter)),
            events: self.events.unwrap_or_else(null_sender),
            abort: AbortHandle::new(),
        }
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Discover → Read → Hash → Write
///
/// Read and hash run on independently sized worker groups; write runs on a
/// single dedicated worker that owns the sink.
pub struct Pipeline {
    config: PipelineConfig,
    fingerprinter: Arc<dyn Fingerprinter>,
    events: EventSender,
    abort: AbortHandle,
}

impl Pipeline {
    /// Create a new pipeline builder
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Handle that aborts the current run from another thread. Once
    /// aborted, the pipeline refuses further runs.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Process every file and write one record per readable file to `sink`.
    ///
    /// Blocks until the write stage has stopped and the sink is flushed.
    /// Unreadable files are skipped and counted. A sink failure aborts the
    /// run and is returned as the error.
    pub fn run<I, S>(&self, files: I, sink: S) -> Result<RunSummary, FingerprintError>
    where
        I: IntoIterator<Item = FileTask>,
        S: ResultSink + 'static,
    {
        let start_time = Instant::now();

        // Discover fully drains the traversal before anything is pushed.
        let files: Vec<FileTask> = files.into_iter().collect();
        let total = files.len();

        self.events.send(Event::Pipeline(PipelineEvent::Started {
            strategy: "pipeline".to_string(),
        }));
        self.events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
            phase: RunPhase::Fingerprinting,
        }));

        let capacity = self.config.queue_capacity;
        let file_queue: Arc<WorkQueue<FileTask>> = Arc::new(WorkQueue::with_capacity(capacity));
        let content_queue: Arc<WorkQueue<ContentTask>> =
            Arc::new(WorkQueue::with_capacity(capacity));
        let result_queue: Arc<WorkQueue<ResultRecord>> =
            Arc::new(WorkQueue::with_capacity(capacity));
        // Released after the stages below have been joined or dropped.
        let _watched = [
            self.abort.watch_scoped(&file_queue),
            self.abort.watch_scoped(&content_queue),
            self.abort.watch_scoped(&result_queue),
        ];

        let mut read = self.read_stage(&file_queue, &content_queue);
        let mut hash = self.hash_stage(&content_queue, &result_queue);
        let writer: Box<dyn Sink<ResultRecord>> = Box::new(ProgressSink {
            inner: sink,
            events: self.events.clone(),
            completed: 0,
            total,
        });
        let mut write = PipelineStage::new(
            "write",
            Arc::clone(&result_queue),
            StageOutput::Sink(writer),
            StageOutcome::Emit,
        )
        .abort_handle(self.abort.clone());

        // Stages dropped on an early return abort the run and join their
        // workers, so no thread outlives this call.
        write.start()?;
        hash.start()?;
        read.start()?;

        info!(
            files = total,
            read_workers = self.config.read_workers,
            hash_workers = self.config.hash_workers,
            "Pipeline started"
        );

        let mut discovered = 0;
        for task in files {
            if file_queue.push(task).is_err() {
                break;
            }
            discovered += 1;
        }
        file_queue.close();
        debug!(discovered, "All files queued");

        let read_report = read.join()?;
        let hash_report = hash.join()?;
        let write_report = write.join()?;

        if let Some(failure) = write.take_failure() {
            self.events.send(Event::Pipeline(PipelineEvent::Error {
                message: failure.to_string(),
            }));
            return Err(failure.into());
        }
        if self.abort.is_aborted() {
            self.events.send(Event::Pipeline(PipelineEvent::Aborted));
            return Err(PipelineError::Aborted.into());
        }

        let summary = RunSummary {
            discovered,
            processed: write_report.emitted,
            skipped: read_report.skipped + hash_report.skipped + write_report.skipped,
            duration_ms: start_time.elapsed().as_millis() as u64,
        };
        debug_assert!(summary.is_balanced(), "unbalanced summary: {:?}", summary);

        info!(
            discovered = summary.discovered,
            processed = summary.processed,
            skipped = summary.skipped,
            duration_ms = summary.duration_ms,
            "Pipeline finished"
        );
        self.events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
            phase: RunPhase::Finished,
        }));
        self.events
            .send(Event::Pipeline(PipelineEvent::Completed { summary }));

        Ok(summary)
    }

    fn read_stage(
        &self,
        input: &Arc<WorkQueue<FileTask>>,
        output: &Arc<WorkQueue<ContentTask>>,
    ) -> PipelineStage<FileTask, ContentTask> {
        let events = self.events.clone();
        PipelineStage::new(
            "read",
            Arc::clone(input),
            StageOutput::Queue(Arc::clone(output)),
            move |task: FileTask| match fs::read(&task.path) {
                Ok(bytes) => StageOutcome::Emit(ContentTask {
                    path: task.path,
                    bytes,
                }),
                Err(source) => {
                    let error = ReadError {
                        path: task.path,
                        source,
                    };
                    report_skip(&events, &error.path, &error);
                    StageOutcome::Skip(error.into())
                }
            },
        )
        .workers(self.config.read_workers)
        .abort_handle(self.abort.clone())
    }

    fn hash_stage(
        &self,
        input: &Arc<WorkQueue<ContentTask>>,
        output: &Arc<WorkQueue<ResultRecord>>,
    ) -> PipelineStage<ContentTask, ResultRecord> {
        let events = self.events.clone();
        let fingerprinter = Arc::clone(&self.fingerprinter);
        PipelineStage::new(
            "hash",
            Arc::clone(input),
            StageOutput::Queue(Arc::clone(output)),
            move |content: ContentTask| {
                match digest_for(fingerprinter.as_ref(), &content.path, &content.bytes) {
                    Ok(digest) => StageOutcome::Emit(ResultRecord {
                        path: content.path,
                        digest,
                    }),
                    Err(error) => {
                        report_skip(&events, &content.path, &error);
                        StageOutcome::Skip(error.into())
                    }
                }
            },
        )
        .workers(self.config.hash_workers)
        .abort_handle(self.abort.clone())
    }
}

pub(crate) fn report_skip(
    events: &EventSender,
    path: &std::path::Path,
    error: &dyn std::fmt::Display,
) {
    events.send(Event::File(FileEvent::Skipped {
        path: path.to_path_buf(),
        message: error.to_string(),
    }));
}

/// Wraps the caller's sink to emit a progress event per written record
pub(crate) struct ProgressSink<S> {
    pub(crate) inner: S,
    pub(crate) events: EventSender,
    pub(crate) completed: usize,
    pub(crate) total: usize,
}

impl<S: ResultSink> ResultSink for ProgressSink<S> {
    fn write(&mut self, record: &ResultRecord) -> Result<(), WriteError> {
        self.inner.write(record)?;
        self.completed += 1;
        self.events.send(Event::File(FileEvent::Written(WriteProgress {
            completed: self.completed,
            total: self.total,
            current_path: record.path.clone(),
        })));
        Ok(())
    }

    fn finish(&mut self) -> Result<(), WriteError> {
        ResultSink::finish(&mut self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hasher::DigestValue;
    use crate::core::reporter::MemorySink;
    use crate::error::HashError;
    use std::collections::HashSet;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    fn write_files(dir: &TempDir, count: usize) -> Vec<FileTask> {
        (0..count)
            .map(|i| {
                let path = dir.path().join(format!("file_{i}.txt"));
                fs::write(&path, format!("content {}", i % 7)).unwrap();
                FileTask::new(path)
            })
            .collect()
    }

    struct FailingSink {
        fail_after: usize,
        seen: usize,
    }

    impl ResultSink for FailingSink {
        fn write(&mut self, record: &ResultRecord) -> Result<(), WriteError> {
            if self.seen == self.fail_after {
                return Err(WriteError::Write {
                    path: record.path.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
                });
            }
            self.seen += 1;
            Ok(())
        }
    }

    struct RejectEmpty;

    impl Fingerprinter for RejectEmpty {
        fn digest(&self, bytes: &[u8]) -> Result<DigestValue, HashError> {
            if bytes.is_empty() {
                return Err(HashError::ComputationFailed {
                    path: PathBuf::new(),
                    reason: "empty".to_string(),
                });
            }
            Xxh3Fingerprinter.digest(bytes)
        }

        fn name(&self) -> &'static str {
            "reject-empty"
        }
    }

    /// Signals once the first digest starts, then hashes slowly
    struct SlowFingerprinter {
        started: crossbeam_channel::Sender<()>,
        begun: AtomicUsize,
        finished: AtomicUsize,
    }

    impl Fingerprinter for SlowFingerprinter {
        fn digest(&self, bytes: &[u8]) -> Result<DigestValue, HashError> {
            self.begun.fetch_add(1, Ordering::SeqCst);
            let _ = self.started.try_send(());
            thread::sleep(Duration::from_millis(5));
            let digest = Xxh3Fingerprinter.digest(bytes);
            self.finished.fetch_add(1, Ordering::SeqCst);
            digest
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    #[test]
    fn builder_sets_widths() {
        let pipeline = Pipeline::builder()
            .read_workers(2)
            .hash_workers(0)
            .queue_capacity(None)
            .build();

        assert_eq!(pipeline.config().read_workers, 2);
        assert_eq!(pipeline.config().hash_workers, 1);
        assert_eq!(pipeline.config().queue_capacity, None);
    }

    #[test]
    fn empty_input_completes() {
        let sink = MemorySink::new();
        let summary = Pipeline::builder()
            .build()
            .run(Vec::new(), sink.clone())
            .unwrap();

        assert_eq!(summary.discovered, 0);
        assert_eq!(summary.processed, 0);
        assert_eq!(summary.skipped, 0);
        assert!(sink.records().is_empty());
    }

    #[test]
    fn every_file_is_written_once() {
        let dir = TempDir::new().unwrap();
        let files = write_files(&dir, 200);
        let sink = MemorySink::new();

        let summary = Pipeline::builder()
            .read_workers(3)
            .hash_workers(4)
            .queue_capacity(Some(2))
            .build()
            .run(files, sink.clone())
            .unwrap();

        let records = sink.records();
        let unique: HashSet<_> = records.iter().map(|r| r.path.clone()).collect();
        assert_eq!(summary.discovered, 200);
        assert_eq!(summary.processed, 200);
        assert_eq!(records.len(), 200);
        assert_eq!(unique.len(), 200);
    }

    #[test]
    fn missing_files_are_skipped_and_counted() {
        let dir = TempDir::new().unwrap();
        let mut files = write_files(&dir, 3);
        files.push(FileTask::new(dir.path().join("vanished.txt")));

        let sink = MemorySink::new();
        let summary = Pipeline::builder()
            .build()
            .run(files, sink.clone())
            .unwrap();

        assert_eq!(summary.discovered, 4);
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.skipped, 1);
        assert!(summary.is_balanced());
        assert!(!sink
            .records()
            .iter()
            .any(|r| r.path.ends_with("vanished.txt")));
    }

    #[test]
    fn fingerprinter_failure_counts_as_skip() {
        let dir = TempDir::new().unwrap();
        let empty = dir.path().join("empty.txt");
        fs::write(&empty, b"").unwrap();
        let full = dir.path().join("full.txt");
        fs::write(&full, b"data").unwrap();

        let summary = Pipeline::builder()
            .fingerprinter(Arc::new(RejectEmpty))
            .build()
            .run(vec![FileTask::new(empty), FileTask::new(full)], MemorySink::new())
            .unwrap();

        assert_eq!(summary.processed, 1);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn identical_content_shares_digest() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, b"hello").unwrap();
        fs::write(&b, b"hello").unwrap();

        let sink = MemorySink::new();
        Pipeline::builder()
            .build()
            .run(vec![FileTask::new(a), FileTask::new(b)], sink.clone())
            .unwrap();

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].digest, records[1].digest);
    }

    #[test]
    fn sink_failure_is_returned_and_aborts() {
        let dir = TempDir::new().unwrap();
        let files = write_files(&dir, 50);

        let pipeline = Pipeline::builder().queue_capacity(Some(1)).build();
        let result = pipeline.run(
            files,
            FailingSink {
                fail_after: 5,
                seen: 0,
            },
        );

        assert!(matches!(
            result,
            Err(FingerprintError::Write(WriteError::Write { .. }))
        ));
        assert!(pipeline.abort_handle().is_aborted());
    }

    #[test]
    fn aborted_pipeline_refuses_to_run() {
        let dir = TempDir::new().unwrap();
        let files = write_files(&dir, 5);

        let pipeline = Pipeline::builder().build();
        pipeline.abort_handle().abort();
        let result = pipeline.run(files, MemorySink::new());

        assert!(matches!(
            result,
            Err(FingerprintError::Pipeline(PipelineError::Aborted))
        ));
    }

    #[test]
    fn abort_from_another_thread_stops_in_flight_run() {
        let dir = TempDir::new().unwrap();
        let files = write_files(&dir, 200);
        let (started_tx, started_rx) = crossbeam_channel::bounded(1);
        let fingerprinter = Arc::new(SlowFingerprinter {
            started: started_tx,
            begun: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        });

        let pipeline = Pipeline::builder()
            .hash_workers(2)
            .queue_capacity(Some(4))
            .fingerprinter(fingerprinter.clone())
            .build();
        let handle = pipeline.abort_handle();
        let aborter = thread::spawn(move || {
            started_rx.recv().unwrap();
            handle.abort();
        });

        let sink = MemorySink::new();
        let result = pipeline.run(files, sink.clone());
        aborter.join().unwrap();

        assert!(matches!(
            result,
            Err(FingerprintError::Pipeline(PipelineError::Aborted))
        ));
        assert!(sink.records().len() < 200);
        // Digests already running when the abort landed ran to completion.
        let begun = fingerprinter.begun.load(Ordering::SeqCst);
        assert!(begun < 200);
        assert_eq!(fingerprinter.finished.load(Ordering::SeqCst), begun);
        assert_eq!(pipeline.abort_handle().watched(), 0);
    }

    #[test]
    fn reused_pipeline_releases_queues_after_each_run() {
        let dir = TempDir::new().unwrap();
        let pipeline = Pipeline::builder().build();

        for _ in 0..3 {
            let summary = pipeline
                .run(write_files(&dir, 4), MemorySink::new())
                .unwrap();
            assert_eq!(summary.processed, 4);
            assert_eq!(pipeline.abort_handle().watched(), 0);
        }
    }

    #[test]
    fn progress_events_count_written_records() {
        let dir = TempDir::new().unwrap();
        let files = write_files(&dir, 10);
        let (sender, receiver) = crate::events::EventChannel::new();

        let pipeline = Pipeline::builder().events(sender).build();
        pipeline.run(files, MemorySink::new()).unwrap();
        drop(pipeline);

        let written = receiver
            .iter()
            .filter(|e| matches!(e, Event::File(FileEvent::Written(_))))
            .count();
        assert_eq!(written, 10);
    }

    #[test]
    fn single_file_with_any_width() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("only.txt");
        fs::write(&path, b"single").unwrap();

        for (read, hash) in [(1, 1), (1, 8), (4, 1), (4, 8)] {
            let sink = MemorySink::new();
            let summary = Pipeline::builder()
                .read_workers(read)
                .hash_workers(hash)
                .build()
                .run(vec![FileTask::new(&path)], sink.clone())
                .unwrap();
            assert_eq!(summary.processed, 1);
            assert_eq!(sink.records().len(), 1);
            assert_eq!(sink.records()[0].path, Path::new(&path));
        }
    }
}
