//! CSV merge sink.
//!
//! One sink owns one output file for the whole run. The file is created (truncating
//! any previous run), a UTF-8 byte-order mark and the fixed header are written,
//! and then rows are appended batch by batch with a flush after every batch.

use csv::StringRecord;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// UTF-8 byte-order mark so spreadsheet tools detect the encoding.
pub const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to create {}: {source}", .path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to flush {}: {source}", .path.display())]
    Flush {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Build the CSV writer every output file in this crate uses.
///
/// Field counts are not enforced: some exchanges omit trailing columns.
pub(crate) fn csv_writer(file: File) -> csv::Writer<File> {
    csv::WriterBuilder::new()
        .flexible(true)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(file)
}

/// Create `path`, write the BOM and `header`, and return the open writer.
pub(crate) fn create_with_header(
    path: &Path,
    header: &[&str],
) -> Result<csv::Writer<File>, SinkError> {
    let mut file = File::create(path).map_err(|source| SinkError::Create {
        path: path.to_path_buf(),
        source,
    })?;
    file.write_all(&UTF8_BOM)
        .map_err(|source| SinkError::Create {
            path: path.to_path_buf(),
            source,
        })?;

    let mut writer = csv_writer(file);
    writer
        .write_record(header)
        .map_err(|source| SinkError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    writer.flush().map_err(|source| SinkError::Flush {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(writer)
}

/// Append-only merged output file.
pub struct MergeSink {
    path: PathBuf,
    writer: csv::Writer<File>,
    rows_written: u64,
}

impl MergeSink {
    /// Create the output file and write its header. Any failure here is fatal for
    /// the run.
    pub fn create(path: impl Into<PathBuf>, header: &[&str]) -> Result<Self, SinkError> {
        let path = path.into();
        let writer = create_with_header(&path, header)?;
        Ok(Self {
            path,
            writer,
            rows_written: 0,
        })
    }

    /// Data rows appended so far (header excluded).
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Append `rows` in order and flush.
    pub fn append_rows(&mut self, rows: &[StringRecord]) -> Result<usize, SinkError> {
        for row in rows {
            self.writer
                .write_record(row)
                .map_err(|source| SinkError::Write {
                    path: self.path.clone(),
                    source,
                })?;
        }
        self.flush()?;
        self.rows_written += rows.len() as u64;
        Ok(rows.len())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush().map_err(|source| SinkError::Flush {
            path: self.path.clone(),
            source,
        })
    }

    /// Flush and close, returning the number of data rows written.
    pub fn finish(mut self) -> Result<u64, SinkError> {
        self.flush()?;
        Ok(self.rows_written)
    }
}

/// Read every record of one extracted daily CSV.
///
/// All or nothing: a file that fails part-way yields an error and no rows.
/// Every record must have the same number of fields as the first one.
pub fn read_rows(path: &Path) -> Result<Vec<StringRecord>, SinkError> {
    let read_err = |source| SinkError::Read {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(read_err)?;
    reader
        .records()
        .collect::<Result<Vec<_>, _>>()
        .map_err(read_err)
}
