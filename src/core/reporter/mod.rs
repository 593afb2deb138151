//! # Reporter Module
//!
//! Writes completed records to the report.
//!
//! ## Formats
//! - **Text** - `<path>: <digest>` per line (default)
//! - **JSON lines** - `{"path": ..., "digest": ...}` per line
//!
//! A sink is owned by a single writer thread, so records are never
//! interleaved and no lock is taken per record.

use crate::core::hasher::DigestValue;
use crate::core::types::ResultRecord;
use crate::error::WriteError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Output encoding of the report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReportFormat {
    #[default]
    Text,
    JsonLines,
}

/// Terminal consumer of result records
pub trait ResultSink: Send {
    /// Persist one record
    fn write(&mut self, record: &ResultRecord) -> Result<(), WriteError>;

    /// Flush buffered output. Called once after the last record.
    fn finish(&mut self) -> Result<(), WriteError> {
        Ok(())
    }
}

impl<S: ResultSink + ?Sized> ResultSink for Box<S> {
    fn write(&mut self, record: &ResultRecord) -> Result<(), WriteError> {
        (**self).write(record)
    }

    fn finish(&mut self) -> Result<(), WriteError> {
        (**self).finish()
    }
}

/// Run a sink call, turning a panic into [`WriteError::Panicked`] so the
/// writer can abort the run instead of unwinding past it.
pub(crate) fn catch_sink_panic<T>(
    call: impl FnOnce() -> Result<T, WriteError>,
) -> Result<T, WriteError> {
    panic::catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|payload| {
        Err(WriteError::Panicked {
            reason: crate::core::pool::panic_message(payload.as_ref()),
        })
    })
}

/// Encode one record as a report line, without the trailing newline
pub fn format_record(record: &ResultRecord, format: ReportFormat) -> Result<String, WriteError> {
    match format {
        ReportFormat::Text => Ok(format!("{}: {}", record.path.display(), record.digest)),
        ReportFormat::JsonLines => {
            serde_json::to_string(record).map_err(|e| WriteError::Encode {
                path: record.path.clone(),
                reason: e.to_string(),
            })
        }
    }
}

/// Decode one report line produced by [`format_record`]
pub fn parse_record(line: &str, format: ReportFormat) -> Option<ResultRecord> {
    match format {
        ReportFormat::Text => {
            let (path, digest) = line.rsplit_once(": ")?;
            Some(ResultRecord {
                path: PathBuf::from(path),
                digest: DigestValue::from_hex(digest.trim_end())?,
            })
        }
        ReportFormat::JsonLines => serde_json::from_str(line).ok(),
    }
}

/// Report sink backed by any writer
pub struct ReportWriter<W: Write + Send> {
    writer: BufWriter<W>,
    format: ReportFormat,
    written: usize,
}

impl ReportWriter<File> {
    /// Create (or truncate) the report file at `path`
    pub fn create(path: &Path, format: ReportFormat) -> Result<Self, WriteError> {
        let file = File::create(path).map_err(|source| WriteError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(file, format))
    }
}

impl<W: Write + Send> ReportWriter<W> {
    pub fn new(writer: W, format: ReportFormat) -> Self {
        Self {
            writer: BufWriter::new(writer),
            format,
            written: 0,
        }
    }

    /// Records written so far
    pub fn written(&self) -> usize {
        self.written
    }
}

impl<W: Write + Send> ResultSink for ReportWriter<W> {
    fn write(&mut self, record: &ResultRecord) -> Result<(), WriteError> {
        let line = format_record(record, self.format)?;
        writeln!(self.writer, "{}", line).map_err(|source| WriteError::Write {
            path: record.path.clone(),
            source,
        })?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), WriteError> {
        self.writer
            .flush()
            .map_err(|source| WriteError::Flush { source })
    }
}

/// In-memory sink; clones share the same record list
#[derive(Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<ResultRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the records received so far
    pub fn records(&self) -> Vec<ResultRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ResultSink for MemorySink {
    fn write(&mut self, record: &ResultRecord) -> Result<(), WriteError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}

/// Read a report file back into records. Lines that fail to parse are
/// returned as an error naming the line.
pub fn read_report(path: &Path, format: ReportFormat) -> std::io::Result<Vec<ResultRecord>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let record = parse_record(&line, format).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("malformed report line {}: {}", number + 1, line),
            )
        })?;
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(path: &str, digest: u64) -> ResultRecord {
        ResultRecord {
            path: PathBuf::from(path),
            digest: DigestValue::from(digest),
        }
    }

    #[test]
    fn text_line_format() {
        let line = format_record(&record("/data/a.txt", 1), ReportFormat::Text).unwrap();
        assert_eq!(line, "/data/a.txt: 0000000000000001");
    }

    #[test]
    fn text_line_parses_back_with_colon_in_path() {
        let original = record("/data/odd: name.txt", 42);
        let line = format_record(&original, ReportFormat::Text).unwrap();
        assert_eq!(parse_record(&line, ReportFormat::Text), Some(original));
    }

    #[test]
    fn json_line_contains_hex_digest() {
        let line = format_record(&record("/data/a.txt", 255), ReportFormat::JsonLines).unwrap();
        assert!(line.contains("\"digest\":\"00000000000000ff\""));
        assert_eq!(
            parse_record(&line, ReportFormat::JsonLines),
            Some(record("/data/a.txt", 255))
        );
    }

    #[test]
    fn writer_flushes_on_finish() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.txt");

        let mut writer = ReportWriter::create(&path, ReportFormat::Text).unwrap();
        writer.write(&record("a", 1)).unwrap();
        writer.write(&record("b", 2)).unwrap();
        writer.finish().unwrap();
        assert_eq!(writer.written(), 2);

        let records = read_report(&path, ReportFormat::Text).unwrap();
        assert_eq!(records, vec![record("a", 1), record("b", 2)]);
    }

    #[test]
    fn create_fails_for_missing_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("report.txt");
        let result = ReportWriter::create(&path, ReportFormat::Text);
        assert!(matches!(result, Err(WriteError::Open { .. })));
    }

    #[test]
    fn memory_sink_clones_share_records() {
        let sink = MemorySink::new();
        let mut writer_side = sink.clone();
        writer_side.write(&record("a", 1)).unwrap();
        assert_eq!(sink.records(), vec![record("a", 1)]);
    }

    #[test]
    fn malformed_report_line_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.txt");
        std::fs::write(&path, "not a record\n").unwrap();
        assert!(read_report(&path, ReportFormat::Text).is_err());
    }
}
