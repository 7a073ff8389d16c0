//! CSV record sink
//!
//! The header row is written only when the target file is new (or empty).
//! Reopening an existing file for a resumed run appends after the existing
//! rows without repeating the header.

use crate::output::traits::{RecordSink, SinkError, SinkResult};
use crate::scrape::Record;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Appending CSV writer shared by all page tasks of a job
pub struct CsvSink {
    path: PathBuf,
    columns: Vec<String>,
    writer: Mutex<Option<csv::Writer<File>>>,
}

impl CsvSink {
    /// Opens `path` for appending, writing the header if the file is new
    ///
    /// # Arguments
    ///
    /// * `path` - The CSV target; parent directories are created if missing
    /// * `columns` - Ordered column names, used for the header and row order
    pub fn open(path: &Path, columns: &[String]) -> SinkResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let size = match std::fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if size == 0 {
            writer.write_record(columns)?;
            writer.flush()?;
            tracing::debug!("Created {} with {} columns", path.display(), columns.len());
        } else {
            tracing::debug!("Appending to existing {} ({} bytes)", path.display(), size);
        }

        Ok(Self {
            path: path.to_path_buf(),
            columns: columns.to_vec(),
            writer: Mutex::new(Some(writer)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Option<csv::Writer<File>>> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_row(&self, writer: &mut csv::Writer<File>, record: &Record) -> SinkResult<()> {
        let row = self
            .columns
            .iter()
            .map(|column| record.get(column).unwrap_or(""));
        writer.write_record(row)?;
        Ok(())
    }
}

impl RecordSink for CsvSink {
    fn write_record(&self, record: &Record) -> SinkResult<()> {
        let mut guard = self.lock();
        let writer = guard.as_mut().ok_or(SinkError::Closed)?;
        self.write_row(writer, record)
    }

    fn write_page(&self, records: &[Record]) -> SinkResult<usize> {
        let mut guard = self.lock();
        let writer = guard.as_mut().ok_or(SinkError::Closed)?;
        for record in records {
            self.write_row(writer, record)?;
        }
        Ok(records.len())
    }

    fn flush(&self) -> SinkResult<()> {
        let mut guard = self.lock();
        let writer = guard.as_mut().ok_or(SinkError::Closed)?;
        writer.flush()?;
        Ok(())
    }

    fn close(&self) -> SinkResult<()> {
        let Some(mut writer) = self.lock().take() else {
            return Ok(());
        };

        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|e| SinkError::Io(e.into_error()))?;
        file.sync_all()?;

        tracing::debug!("Closed {}", self.path.display());
        Ok(())
    }
}
