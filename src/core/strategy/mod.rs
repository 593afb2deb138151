//! # Strategy Module
//!
//! Four ways to run the same job, from simplest to fully staged:
//!
//! | Strategy | Concurrency |
//! |----------|-------------|
//! | `Sequential` | one thread reads, hashes and writes each file in turn |
//! | `Threaded` | files split into fixed chunks, one thread per chunk |
//! | `Pool` | one [`WorkerPool`](crate::core::pool::WorkerPool) task per file |
//! | `Pipeline` | staged [`Pipeline`] with bounded queues |
//!
//! All of them write through a single writer and return the same
//! [`RunSummary`], so reports are interchangeable up to line order.

mod pooled;
mod sequential;
mod threaded;

pub use pooled::PoolExecutor;
pub use sequential::SequentialExecutor;
pub use threaded::ThreadedExecutor;

use crate::core::hasher::{digest_for, FingerprintAlgorithm, Fingerprinter};
use crate::core::pipeline::{AbortHandle, Pipeline, PipelineConfig};
use crate::core::pool::default_parallelism;
use crate::core::queue::WorkQueue;
use crate::core::reporter::{catch_sink_panic, ReportFormat, ReportWriter, ResultSink};
use crate::core::scanner::{FileScanner, ScanConfig, WalkDirScanner};
use crate::core::types::{FileTask, ResultRecord, RunSummary};
use crate::error::{FingerprintError, ReadError, WriteError};
use crate::events::{Event, EventSender, PipelineEvent, RunPhase};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// How a run is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Strategy {
    Sequential,
    Threaded,
    Pool,
    #[default]
    Pipeline,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Sequential => write!(f, "sequential"),
            Strategy::Threaded => write!(f, "threaded"),
            Strategy::Pool => write!(f, "pool"),
            Strategy::Pipeline => write!(f, "pipeline"),
        }
    }
}

/// Runs a list of files into a sink
pub trait Executor {
    fn execute(
        &self,
        files: Vec<FileTask>,
        sink: Box<dyn ResultSink>,
    ) -> Result<RunSummary, FingerprintError>;
}

impl Executor for Pipeline {
    fn execute(
        &self,
        files: Vec<FileTask>,
        sink: Box<dyn ResultSink>,
    ) -> Result<RunSummary, FingerprintError> {
        self.run(files, sink)
    }
}

/// Everything a run needs besides the root and the output
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub strategy: Strategy,
    /// Stage widths and queue bound for the pipeline strategy
    pub pipeline: PipelineConfig,
    /// Thread count for the threaded and pool strategies
    pub threads: usize,
    pub algorithm: FingerprintAlgorithm,
    pub format: ReportFormat,
    pub scan: ScanConfig,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            pipeline: PipelineConfig::default(),
            threads: default_parallelism(),
            algorithm: FingerprintAlgorithm::default(),
            format: ReportFormat::default(),
            scan: ScanConfig::default(),
        }
    }
}

impl RunOptions {
    /// Build the executor selected by `strategy`
    pub fn executor(&self, events: &EventSender) -> Box<dyn Executor> {
        let fingerprinter = self.algorithm.build();
        match self.strategy {
            Strategy::Sequential => {
                Box::new(SequentialExecutor::new(fingerprinter, events.clone()))
            }
            Strategy::Threaded => Box::new(ThreadedExecutor::new(
                self.threads,
                fingerprinter,
                events.clone(),
            )),
            Strategy::Pool => Box::new(PoolExecutor::new(
                self.threads,
                fingerprinter,
                events.clone(),
            )),
            Strategy::Pipeline => Box::new(
                Pipeline::builder()
                    .config(self.pipeline.clone())
                    .fingerprinter(fingerprinter)
                    .events(events.clone())
                    .build(),
            ),
        }
    }
}

/// Fingerprint every regular file under `root` and write the report to
/// `output`.
///
/// Traversal happens first and is fatal on error; the report file is only
/// created once every file is known.
pub fn fingerprint_tree(
    root: &Path,
    output: &Path,
    options: &RunOptions,
    events: &EventSender,
) -> Result<RunSummary, FingerprintError> {
    events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
        phase: RunPhase::Discovering,
    }));

    let scanner = WalkDirScanner::new(options.scan.clone())?;
    let scan = scanner.scan_with_events(root, events)?;
    info!(
        root = %root.display(),
        files = scan.files.len(),
        strategy = %options.strategy,
        "Discovery finished"
    );

    let sink = ReportWriter::create(output, options.format)?;
    options.executor(events).execute(scan.files, Box::new(sink))
}

/// Read a file and fingerprint its bytes
pub(crate) fn fingerprint_file(
    fingerprinter: &dyn Fingerprinter,
    path: &Path,
) -> Result<ResultRecord, FingerprintError> {
    let bytes = fs::read(path).map_err(|source| ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    let digest = digest_for(fingerprinter, path, &bytes)?;
    Ok(ResultRecord {
        path: path.to_path_buf(),
        digest,
    })
}

/// Single-writer loop: drain `results` into `sink` until the queue closes.
///
/// A write failure or a panicking sink aborts the run so producers stop
/// pushing.
pub(crate) fn drain_to_sink(
    results: &WorkQueue<ResultRecord>,
    sink: &mut dyn ResultSink,
    abort: &AbortHandle,
) -> Result<usize, WriteError> {
    let mut written = 0;
    while let Some(record) = results.pop() {
        if let Err(e) = catch_sink_panic(|| sink.write(&record)) {
            abort.abort();
            return Err(e);
        }
        written += 1;
    }
    if let Err(e) = catch_sink_panic(|| sink.finish()) {
        abort.abort();
        return Err(e);
    }
    Ok(written)
}

/// Emit the events that open a run
pub(crate) fn announce_start(events: &EventSender, strategy: Strategy) {
    events.send(Event::Pipeline(PipelineEvent::Started {
        strategy: strategy.to_string(),
    }));
    events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
        phase: RunPhase::Fingerprinting,
    }));
}

/// Log and emit the events that close a successful run
pub(crate) fn announce_finish(events: &EventSender, strategy: Strategy, summary: RunSummary) {
    debug_assert!(summary.is_balanced(), "unbalanced summary: {:?}", summary);
    info!(
        strategy = %strategy,
        discovered = summary.discovered,
        processed = summary.processed,
        skipped = summary.skipped,
        duration_ms = summary.duration_ms,
        "Run finished"
    );
    events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
        phase: RunPhase::Finished,
    }));
    events.send(Event::Pipeline(PipelineEvent::Completed { summary }));
}

/// Queue between producers and the writer for the threaded and pool
/// strategies
pub(crate) fn result_queue(abort: &AbortHandle) -> Arc<WorkQueue<ResultRecord>> {
    let queue = Arc::new(WorkQueue::bounded(
        crate::core::pipeline::DEFAULT_QUEUE_CAPACITY,
    ));
    abort.watch(&queue);
    queue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::reporter::{read_report, MemorySink};
    use crate::events::null_sender;
    use std::collections::HashSet;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    struct ExplodingSink;

    impl ResultSink for ExplodingSink {
        fn write(&mut self, _record: &ResultRecord) -> Result<(), WriteError> {
            panic!("sink exploded");
        }
    }

    const ALL: [Strategy; 4] = [
        Strategy::Sequential,
        Strategy::Threaded,
        Strategy::Pool,
        Strategy::Pipeline,
    ];

    fn options(strategy: Strategy) -> RunOptions {
        RunOptions {
            strategy,
            threads: 3,
            pipeline: PipelineConfig {
                read_workers: 2,
                hash_workers: 3,
                queue_capacity: Some(4),
            },
            ..Default::default()
        }
    }

    fn populate(dir: &TempDir, count: usize) {
        for i in 0..count {
            fs::write(dir.path().join(format!("f{i}.dat")), vec![i as u8; i * 3]).unwrap();
        }
    }

    #[test]
    fn all_strategies_produce_the_same_records() {
        let dir = TempDir::new().unwrap();
        populate(&dir, 40);
        let files: Vec<FileTask> = WalkDirScanner::new(ScanConfig::default())
            .unwrap()
            .scan(dir.path())
            .unwrap()
            .files;

        let mut reports = Vec::new();
        for strategy in ALL {
            let sink = MemorySink::new();
            let summary = options(strategy)
                .executor(&null_sender())
                .execute(files.clone(), Box::new(sink.clone()))
                .unwrap();
            assert_eq!(summary.processed, 40, "strategy {strategy}");
            assert!(summary.is_balanced(), "strategy {strategy}");

            let records: HashSet<ResultRecord> = sink.records().into_iter().collect();
            assert_eq!(records.len(), 40, "strategy {strategy}");
            reports.push(records);
        }

        for other in &reports[1..] {
            assert_eq!(&reports[0], other);
        }
    }

    #[test]
    fn all_strategies_handle_empty_input() {
        for strategy in ALL {
            let summary = options(strategy)
                .executor(&null_sender())
                .execute(Vec::new(), Box::new(MemorySink::new()))
                .unwrap();
            assert_eq!(summary.discovered, 0, "strategy {strategy}");
            assert_eq!(summary.processed, 0, "strategy {strategy}");
        }
    }

    #[test]
    fn all_strategies_skip_missing_files() {
        let dir = TempDir::new().unwrap();
        populate(&dir, 5);
        let mut files: Vec<FileTask> = (0..5)
            .map(|i| FileTask::new(dir.path().join(format!("f{i}.dat"))))
            .collect();
        files.push(FileTask::new(dir.path().join("gone.dat")));

        for strategy in ALL {
            let summary = options(strategy)
                .executor(&null_sender())
                .execute(files.clone(), Box::new(MemorySink::new()))
                .unwrap();
            assert_eq!(summary.processed, 5, "strategy {strategy}");
            assert_eq!(summary.skipped, 1, "strategy {strategy}");
        }
    }

    #[test]
    fn panicking_sink_fails_every_strategy_without_hanging() {
        let dir = TempDir::new().unwrap();
        // More files than the result queue holds, so producers fill it.
        populate(&dir, 600);
        let files: Vec<FileTask> = (0..600)
            .map(|i| FileTask::new(dir.path().join(format!("f{i}.dat"))))
            .collect();

        for strategy in ALL {
            let files = files.clone();
            let (done_tx, done_rx) = crossbeam_channel::bounded(1);
            thread::spawn(move || {
                let result = options(strategy)
                    .executor(&null_sender())
                    .execute(files, Box::new(ExplodingSink));
                let _ = done_tx.send(result);
            });

            let result = done_rx
                .recv_timeout(Duration::from_secs(30))
                .unwrap_or_else(|_| panic!("strategy {strategy} did not return"));
            assert!(
                matches!(
                    result,
                    Err(FingerprintError::Write(WriteError::Panicked { .. }))
                ),
                "strategy {strategy}: {result:?}"
            );
        }
    }

    #[test]
    fn fingerprint_tree_writes_report() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("root");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("a.txt"), b"hello").unwrap();
        fs::write(root.join("b.txt"), b"hello").unwrap();
        let output = dir.path().join("hashes.txt");

        let summary =
            fingerprint_tree(&root, &output, &RunOptions::default(), &null_sender()).unwrap();
        assert_eq!(summary.processed, 2);

        let records = read_report(&output, ReportFormat::Text).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].digest, records[1].digest);
    }

    #[test]
    fn discovery_failure_creates_no_report() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("hashes.txt");

        let result = fingerprint_tree(
            &dir.path().join("missing"),
            &output,
            &RunOptions::default(),
            &null_sender(),
        );

        assert!(matches!(result, Err(FingerprintError::Discovery(_))));
        assert!(!output.exists());
    }

    #[test]
    fn strategy_display_names() {
        let names: Vec<String> = ALL.iter().map(|s| s.to_string()).collect();
        assert_eq!(names, ["sequential", "threaded", "pool", "pipeline"]);
    }
}
