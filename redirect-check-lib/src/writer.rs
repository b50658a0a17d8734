//! Serialized result output.
//!
//! [`ResultWriter`] owns the output stream. The header is written and flushed
//! on construction; afterwards each [`ResultWriter::write`] call appends one
//! complete record and flushes while holding the lock, so concurrent callers
//! never interleave fields and an interrupted run leaves a valid CSV file.
//!
//! Records appear in completion order, not input order.

use crate::error::RedirectCheckError;
use crate::types::{Outcome, OUTPUT_HEADER};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub struct ResultWriter<W: Write> {
    inner: Mutex<csv::Writer<W>>,
    label: String,
    rows_written: AtomicUsize,
}

impl ResultWriter<File> {
    /// Create (truncate) the output file and write the header.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, RedirectCheckError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| {
            RedirectCheckError::output(
                path.to_string_lossy(),
                format!("Failed to create output file: {}", e),
            )
        })?;
        Self::new(file, path.to_string_lossy())
    }
}

impl<W: Write> ResultWriter<W> {
    /// Wrap a sink and write the header. `label` names the sink in errors.
    pub fn new<L: Into<String>>(sink: W, label: L) -> Result<Self, RedirectCheckError> {
        let label = label.into();
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(sink);

        writer
            .write_record(OUTPUT_HEADER)
            .and_then(|_| writer.flush().map_err(csv::Error::from))
            .map_err(|e| {
                RedirectCheckError::output(label.as_str(), format!("Failed to write header: {}", e))
            })?;

        Ok(Self {
            inner: Mutex::new(writer),
            label,
            rows_written: AtomicUsize::new(0),
        })
    }

    /// Append one outcome and flush it.
    pub fn write(&self, outcome: &Outcome) -> Result<(), RedirectCheckError> {
        let record = outcome.to_record();
        let mut writer = self
            .inner
            .lock()
            .map_err(|_| RedirectCheckError::internal("result writer lock poisoned"))?;

        writer
            .write_record(&record)
            .and_then(|_| writer.flush().map_err(csv::Error::from))
            .map_err(|e| {
                RedirectCheckError::output(self.label.as_str(), format!("Failed to write row: {}", e))
            })?;

        self.rows_written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Data rows written so far (header excluded).
    pub fn rows_written(&self) -> usize {
        self.rows_written.load(Ordering::Relaxed)
    }

    /// Flush and hand back the underlying sink.
    pub fn into_inner(self) -> Result<W, RedirectCheckError> {
        let label = self.label;
        let writer = self
            .inner
            .into_inner()
            .map_err(|_| RedirectCheckError::internal("result writer lock poisoned"))?;
        writer
            .into_inner()
            .map_err(|e| RedirectCheckError::output(label, format!("Failed to flush: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Action;
    use std::sync::Arc;

    fn outcome(i: usize) -> Outcome {
        Outcome {
            identifier: format!("SKU-{}", i),
            source: format!("https://shop.example/old/{}?a=1,2", i),
            destination: format!("https://shop.example/new/{}", i),
            action: Action::Redirect,
            source_status: 200,
            destination_status: 404,
        }
    }

    #[test]
    fn test_header_written_on_creation() {
        let writer = ResultWriter::new(Vec::new(), "memory").unwrap();
        let out = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(out, "Sku,De,Para,Status,De Status,Para Status\n");
    }

    #[test]
    fn test_header_is_on_disk_before_any_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let writer = ResultWriter::create(&path).unwrap();

        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert_eq!(on_disk.lines().count(), 1);

        writer.write(&outcome(1)).unwrap();
        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert_eq!(on_disk.lines().count(), 2);
        assert!(on_disk.contains("SKU-1"));
    }

    #[test]
    fn test_create_in_missing_directory_fails() {
        let err = ResultWriter::create("/no/such/dir/out.csv").err().unwrap();
        assert!(matches!(err, RedirectCheckError::OutputError { .. }));
    }

    #[test]
    fn test_fields_with_commas_are_quoted() {
        let writer = ResultWriter::new(Vec::new(), "memory").unwrap();
        writer.write(&outcome(3)).unwrap();
        let out = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert!(out.contains("\"https://shop.example/old/3?a=1,2\""));
        assert!(out.ends_with("REDIRECIONAR,200,404\n"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writes_never_interleave() {
        let writer = Arc::new(ResultWriter::new(Vec::new(), "memory").unwrap());
        let count = 200;

        let mut handles = Vec::new();
        for i in 0..count {
            let writer = Arc::clone(&writer);
            handles.push(tokio::spawn(async move {
                writer.write(&outcome(i)).unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(writer.rows_written(), count);
        let writer = Arc::try_unwrap(writer).ok().unwrap();
        let out = writer.into_inner().unwrap();

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(out.as_slice());
        let mut seen = std::collections::HashSet::new();
        for record in reader.records() {
            let record = record.unwrap();
            assert_eq!(record.len(), 6);
            let i: usize = record[0].trim_start_matches("SKU-").parse().unwrap();
            assert_eq!(&record[1], format!("https://shop.example/old/{}?a=1,2", i));
            assert_eq!(&record[2], format!("https://shop.example/new/{}", i));
            assert!(seen.insert(i));
        }
        assert_eq!(seen.len(), count);
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), count + 1);
    }
}
