//! Timestamp decomposition pass.
//!
//! Re-reads a merged Huobi file and writes an enriched copy in which the leading
//! epoch-seconds id is expanded into a formatted local timestamp plus year, month,
//! day and hour columns. The source file is left untouched.
//!
//! Unlike the crawl, this pass is not tolerant: the first row whose id does not
//! parse as an integer stops it with an error. Rows written before that point stay
//! in the output and are always complete.

use crate::calendar::TimeZoneSetting;
use crate::schema::ENRICHED_HEADER;
use crate::sink::{create_with_header, SinkError};
use csv::StringRecord;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Minimum number of native fields: id, open, close, high, low, amount, vol.
const REQUIRED_FIELDS: usize = 7;

#[derive(Debug, Error)]
pub enum DecomposeError {
    #[error("failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to read {} near line {line}: {source}", .path.display())]
    Read {
        path: PathBuf,
        line: u64,
        #[source]
        source: csv::Error,
    },

    #[error("line {line}: invalid epoch timestamp '{value}' in row '{content}'")]
    InvalidTimestamp {
        line: u64,
        value: String,
        content: String,
    },

    #[error("line {line}: epoch timestamp {epoch} is out of range")]
    TimestampOutOfRange { line: u64, epoch: i64 },

    #[error("line {line}: expected at least 7 fields, found {found}")]
    MissingFields { line: u64, found: usize },

    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Outcome of a completed pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecomposeSummary {
    pub source: PathBuf,
    pub output: PathBuf,
    pub rows_written: u64,
}

/// Decompose `source` into `dest` using `tz` for the calendar fields.
pub fn decompose(
    source: &Path,
    dest: &Path,
    tz: TimeZoneSetting,
) -> Result<DecomposeSummary, DecomposeError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(source)
        .map_err(|e| DecomposeError::Open {
            path: source.to_path_buf(),
            source: e,
        })?;

    let mut writer = create_with_header(dest, &ENRICHED_HEADER)?;

    let mut rows_written = 0u64;
    let mut outcome: Result<(), DecomposeError> = Ok(());
    for (index, result) in reader.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                outcome = Err(DecomposeError::Read {
                    path: source.to_path_buf(),
                    line: e.position().map_or(index as u64 + 1, |p| p.line()),
                    source: e,
                });
                break;
            }
        };
        // First record is the merged file's header.
        if index == 0 {
            continue;
        }

        let line = record.position().map_or(index as u64 + 1, |p| p.line());
        let row = match enrich(&record, line, tz) {
            Ok(row) => row,
            Err(e) => {
                outcome = Err(e);
                break;
            }
        };
        if let Err(e) = writer.write_record(&row) {
            outcome = Err(SinkError::Write {
                path: dest.to_path_buf(),
                source: e,
            }
            .into());
            break;
        }
        rows_written += 1;
    }

    // Flush even on failure so the output ends at the last complete row.
    let flushed = writer.flush().map_err(|e| SinkError::Flush {
        path: dest.to_path_buf(),
        source: e,
    });
    outcome?;
    flushed?;

    Ok(DecomposeSummary {
        source: source.to_path_buf(),
        output: dest.to_path_buf(),
        rows_written,
    })
}

/// Build one enriched row from one merged row.
fn enrich(
    record: &StringRecord,
    line: u64,
    tz: TimeZoneSetting,
) -> Result<Vec<String>, DecomposeError> {
    let id = record.get(0).unwrap_or_default();
    let epoch: i64 = id.parse().map_err(|_| DecomposeError::InvalidTimestamp {
        line,
        value: id.to_string(),
        content: record.iter().collect::<Vec<_>>().join(","),
    })?;

    if record.len() < REQUIRED_FIELDS {
        return Err(DecomposeError::MissingFields {
            line,
            found: record.len(),
        });
    }

    let fields = tz
        .breakdown(epoch)
        .ok_or(DecomposeError::TimestampOutOfRange { line, epoch })?;

    let mut row = Vec::with_capacity(ENRICHED_HEADER.len());
    row.push(id.to_string());
    row.push(fields.formatted);
    row.push(fields.year.to_string());
    row.push(fields.month.to_string());
    row.push(fields.day.to_string());
    row.push(fields.hour.to_string());
    row.extend(record.iter().skip(1).take(REQUIRED_FIELDS - 1).map(String::from));
    // Trade count is optional upstream.
    row.push(record.get(REQUIRED_FIELDS).unwrap_or("").to_string());
    Ok(row)
}
