//! Observer capability for crawl progress.
//!
//! The entry point constructs an observer and hands it to the pipeline; the library
//! itself never configures logging. `TracingObserver` turns every callback into a
//! structured `tracing` event, `NullObserver` discards them.

use crate::pipeline::{DayOutcome, MergeSummary};
use klinefetch_core::{ArchiveRecord, DecomposeSummary, Exchange};
use std::path::Path;
use tracing::{info, warn};

/// Progress callbacks for a run.
///
/// Called from worker threads when the crawl runs with more than one worker.
pub trait PipelineObserver: Send + Sync {
    /// Called once, after the output file has been created.
    fn on_crawl_start(&self, exchange: Exchange, total_days: usize, output: &Path);

    /// Called before a day's archive is fetched.
    fn on_day_start(&self, record: &ArchiveRecord, index: usize, total: usize);

    /// Called after a day's rows were appended, or after it failed.
    fn on_day_complete(&self, record: &ArchiveRecord, outcome: &DayOutcome);

    /// Called once the whole range has been walked.
    fn on_crawl_complete(&self, summary: &MergeSummary);

    /// Called after a successful decomposition pass.
    fn on_decompose_complete(&self, summary: &DecomposeSummary);
}

/// Emits structured `tracing` events.
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn on_crawl_start(&self, exchange: Exchange, total_days: usize, output: &Path) {
        info!(
            %exchange,
            total_days,
            output = %output.display(),
            "starting kline crawl"
        );
    }

    fn on_day_start(&self, record: &ArchiveRecord, index: usize, total: usize) {
        info!(
            day = %record.day,
            url = %record.url,
            "[{}/{}] fetching kline archive",
            index + 1,
            total
        );
    }

    fn on_day_complete(&self, record: &ArchiveRecord, outcome: &DayOutcome) {
        match outcome {
            DayOutcome::Merged(report) => {
                info!(
                    day = %record.day,
                    files = ?report.files,
                    rows = report.rows,
                    "merged kline archive"
                );
                for err in &report.unreadable {
                    warn!(day = %record.day, error = %err, "skipped unreadable extracted file");
                }
            }
            DayOutcome::Failed { partial, error } => {
                warn!(
                    day = %record.day,
                    url = %record.url,
                    archive = %record.archive_path.display(),
                    rows_appended = partial.rows,
                    error = %error,
                    "kline archive unavailable"
                );
            }
        }
    }

    fn on_crawl_complete(&self, summary: &MergeSummary) {
        info!(
            exchange = %summary.exchange,
            output = %summary.output.display(),
            days_total = summary.days_total,
            days_merged = summary.days_merged,
            days_failed = summary.days_failed,
            rows_written = summary.rows_written,
            "kline crawl complete"
        );
    }

    fn on_decompose_complete(&self, summary: &DecomposeSummary) {
        info!(
            source = %summary.source.display(),
            output = %summary.output.display(),
            rows_written = summary.rows_written,
            "timestamp decomposition complete"
        );
    }
}

/// Discards every callback.
pub struct NullObserver;

impl PipelineObserver for NullObserver {
    fn on_crawl_start(&self, _exchange: Exchange, _total_days: usize, _output: &Path) {}
    fn on_day_start(&self, _record: &ArchiveRecord, _index: usize, _total: usize) {}
    fn on_day_complete(&self, _record: &ArchiveRecord, _outcome: &DayOutcome) {}
    fn on_crawl_complete(&self, _summary: &MergeSummary) {}
    fn on_decompose_complete(&self, _summary: &DecomposeSummary) {}
}
