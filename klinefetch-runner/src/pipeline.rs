//! Crawl orchestration: walk the range, fetch → extract → read → append per day.
//!
//! Per-day failures (network, corrupt or tainted archive) are reported to the
//! observer and the walk moves on; a missing day simply contributes no rows.
//! Only failing to create the merged output, or a failed decomposition pass,
//! aborts the run.
//!
//! With `workers > 1` the downloads of each batch of `workers` days run on a bounded
//! rayon pool. Extraction, reading and appending stay on the calling thread in day
//! order, since days may ship entries under the same name in the shared data
//! directory. The merged file is therefore identical to a sequential run.

use crate::config::{ConfigError, RunConfig};
use crate::observer::PipelineObserver;
use chrono::NaiveDate;
use csv::StringRecord;
use klinefetch_core::calendar::CalendarError;
use klinefetch_core::{
    decompose, extract, read_rows, ArchiveRecord, ArchiveSource, DecomposeError,
    DecomposeSummary, Exchange, ExtractError, FetchError, MergeSink, SinkError,
};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Fatal errors: the run stops.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Calendar(#[from] CalendarError),

    #[error("cannot write merged output: {0}")]
    Output(#[from] SinkError),

    #[error("failed to start worker pool: {0}")]
    WorkerPool(String),

    #[error("decomposition pass failed: {0}")]
    Decompose(#[from] DecomposeError),
}

/// Per-day errors: the day contributes no (further) rows, the walk continues.
#[derive(Debug, Error)]
pub enum DayError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("append failed: {0}")]
    Append(SinkError),
}

/// What one day contributed.
#[derive(Debug, Default)]
pub struct DayReport {
    /// Extracted files whose rows were appended, in append order.
    pub files: Vec<PathBuf>,
    pub rows: usize,
    /// Extracted files that could not be read as CSV.
    pub unreadable: Vec<SinkError>,
}

#[derive(Debug)]
pub enum DayOutcome {
    Merged(DayReport),
    /// `partial` holds whatever was appended before `error`; empty unless an
    /// append failed midway through the day.
    Failed { partial: DayReport, error: DayError },
}

impl DayOutcome {
    fn failed(error: impl Into<DayError>) -> Self {
        Self::Failed {
            partial: DayReport::default(),
            error: error.into(),
        }
    }
}

/// A day that did not merge completely, kept for the run summary.
#[derive(Debug, Clone, Serialize)]
pub struct FailedDay {
    pub day: NaiveDate,
    pub url: String,
    pub error: String,
    /// Files and rows appended before the failure.
    pub files_merged: usize,
    pub rows_written: usize,
}

/// Result of walking the full range.
#[derive(Debug, Clone, Serialize)]
pub struct MergeSummary {
    pub exchange: Exchange,
    pub output: PathBuf,
    pub days_total: usize,
    pub days_merged: usize,
    pub days_failed: usize,
    pub files_merged: usize,
    pub files_unreadable: usize,
    pub rows_written: u64,
    pub failed_days: Vec<FailedDay>,
}

impl MergeSummary {
    fn new(exchange: Exchange, output: PathBuf, days_total: usize) -> Self {
        Self {
            exchange,
            output,
            days_total,
            days_merged: 0,
            days_failed: 0,
            files_merged: 0,
            files_unreadable: 0,
            rows_written: 0,
            failed_days: Vec::new(),
        }
    }

    fn record(&mut self, record: &ArchiveRecord, outcome: &DayOutcome) {
        match outcome {
            DayOutcome::Merged(report) => {
                self.days_merged += 1;
                self.files_merged += report.files.len();
                self.files_unreadable += report.unreadable.len();
            }
            DayOutcome::Failed { partial, error } => {
                self.days_failed += 1;
                self.files_merged += partial.files.len();
                self.files_unreadable += partial.unreadable.len();
                self.failed_days.push(FailedDay {
                    day: record.day,
                    url: record.url.clone(),
                    error: error.to_string(),
                    files_merged: partial.files.len(),
                    rows_written: partial.rows,
                });
            }
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.days_failed == 0 && self.files_unreadable == 0
    }
}

/// Crawl plus the optional decomposition pass.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub crawl: MergeSummary,
    pub decompose: Option<DecomposeSummary>,
}

/// One extracted file and its rows, read in full.
struct ExtractedFile {
    path: PathBuf,
    rows: Result<Vec<StringRecord>, SinkError>,
}

/// Run the crawl and, when enabled, the decomposition pass over its output.
pub fn run(
    config: &RunConfig,
    source: &dyn ArchiveSource,
    observer: &dyn PipelineObserver,
) -> Result<RunReport, PipelineError> {
    let crawl = run_crawl(config, source, observer)?;

    let decompose = match config.enriched_path() {
        Some(dest) => {
            let summary = decompose(&crawl.output, &dest, config.timezone)?;
            observer.on_decompose_complete(&summary);
            Some(summary)
        }
        None => None,
    };

    Ok(RunReport { crawl, decompose })
}

/// Walk the configured range and merge every available day into one CSV.
pub fn run_crawl(
    config: &RunConfig,
    source: &dyn ArchiveSource,
    observer: &dyn PipelineObserver,
) -> Result<MergeSummary, PipelineError> {
    config.validate()?;

    let exchange = config.exchange.exchange();
    let kline = config.exchange.source();
    let records: Vec<ArchiveRecord> = kline
        .range()?
        .map(|day| kline.archive_for(day, &config.data_dir))
        .collect();
    let total = records.len();

    let output = config.merged_path();
    let mut sink = MergeSink::create(&output, exchange.merged_header())?;
    observer.on_crawl_start(exchange, total, &output);

    let mut summary = MergeSummary::new(exchange, output, total);

    if config.workers <= 1 {
        for (index, record) in records.iter().enumerate() {
            observer.on_day_start(record, index, total);
            let fetched = fetch_day(source, record);
            let outcome = merge_day(&mut sink, prepare_day(fetched, record, &config.data_dir));
            observer.on_day_complete(record, &outcome);
            summary.record(record, &outcome);
        }
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .build()
            .map_err(|e| PipelineError::WorkerPool(e.to_string()))?;

        for (batch, chunk) in records.chunks(config.workers).enumerate() {
            let base = batch * config.workers;
            let fetched: Vec<_> = pool.install(|| {
                chunk
                    .par_iter()
                    .enumerate()
                    .map(|(offset, record)| {
                        observer.on_day_start(record, base + offset, total);
                        fetch_day(source, record)
                    })
                    .collect()
            });

            for (record, fetched) in chunk.iter().zip(fetched) {
                let outcome = merge_day(&mut sink, prepare_day(fetched, record, &config.data_dir));
                observer.on_day_complete(record, &outcome);
                summary.record(record, &outcome);
            }
        }
    }

    summary.rows_written = sink.finish()?;
    observer.on_crawl_complete(&summary);
    Ok(summary)
}

/// Download one day's archive into the data directory.
fn fetch_day(source: &dyn ArchiveSource, record: &ArchiveRecord) -> Result<(), DayError> {
    source.fetch(&record.url, &record.archive_path)?;
    Ok(())
}

/// Extract a fetched archive, then read each extracted file in full.
fn prepare_day(
    fetched: Result<(), DayError>,
    record: &ArchiveRecord,
    data_dir: &Path,
) -> Result<Vec<ExtractedFile>, DayError> {
    fetched?;
    let paths = extract(&record.archive_path, data_dir)?;

    Ok(paths
        .into_iter()
        .filter(|path| path.is_file())
        .map(|path| {
            let rows = read_rows(&path);
            ExtractedFile { path, rows }
        })
        .collect())
}

/// Append a prepared day's rows, file by file in extraction order.
fn merge_day(sink: &mut MergeSink, prepared: Result<Vec<ExtractedFile>, DayError>) -> DayOutcome {
    let files = match prepared {
        Ok(files) => files,
        Err(e) => return DayOutcome::failed(e),
    };

    let mut report = DayReport::default();
    for file in files {
        match file.rows {
            Ok(rows) => match sink.append_rows(&rows) {
                Ok(n) => {
                    report.rows += n;
                    report.files.push(file.path);
                }
                Err(e) => {
                    return DayOutcome::Failed {
                        partial: report,
                        error: DayError::Append(e),
                    }
                }
            },
            Err(e) => report.unreadable.push(e),
        }
    }
    DayOutcome::Merged(report)
}
