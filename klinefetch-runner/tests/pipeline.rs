//! Integration tests for the crawl pipeline.
//!
//! Archives are served by an in-memory `ArchiveSource`, so these tests never touch
//! the network. Every test works in its own temporary data directory.

use chrono::NaiveDate;
use klinefetch_core::schema::{BINANCE_HEADER, ENRICHED_HEADER, HUOBI_HEADER};
use klinefetch_core::{ArchiveRecord, ArchiveSource, DecomposeSummary, Exchange, FetchError};
use klinefetch_runner::{
    run, run_crawl, DayOutcome, MergeSummary, NullObserver, PipelineError, PipelineObserver,
    RunConfig,
};
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Mutex;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const BOM: &str = "\u{feff}";

/// Serves prepared archive bytes by URL and records every request.
#[derive(Default)]
struct FixtureSource {
    archives: HashMap<String, Vec<u8>>,
    requested: Mutex<Vec<String>>,
}

impl FixtureSource {
    fn with(mut self, url: String, bytes: Vec<u8>) -> Self {
        self.archives.insert(url, bytes);
        self
    }

    fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

impl ArchiveSource for FixtureSource {
    fn name(&self) -> &str {
        "fixture"
    }

    fn fetch(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        self.requested.lock().unwrap().push(url.to_string());
        match self.archives.get(url) {
            Some(bytes) => {
                std::fs::write(dest, bytes).map_err(|source| FetchError::Io {
                    path: dest.to_path_buf(),
                    source,
                })?;
                Ok(bytes.len() as u64)
            }
            None => Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

/// Records day outcomes as (day, merged?) pairs.
#[derive(Default)]
struct RecordingObserver {
    days: Mutex<Vec<(NaiveDate, bool)>>,
    decomposed: Mutex<Option<u64>>,
}

impl PipelineObserver for RecordingObserver {
    fn on_crawl_start(&self, _exchange: Exchange, _total_days: usize, _output: &Path) {}
    fn on_day_start(&self, _record: &ArchiveRecord, _index: usize, _total: usize) {}

    fn on_day_complete(&self, record: &ArchiveRecord, outcome: &DayOutcome) {
        let merged = matches!(outcome, DayOutcome::Merged(_));
        self.days.lock().unwrap().push((record.day, merged));
    }

    fn on_crawl_complete(&self, _summary: &MergeSummary) {}

    fn on_decompose_complete(&self, summary: &DecomposeSummary) {
        *self.decomposed.lock().unwrap() = Some(summary.rows_written);
    }
}

fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut zw = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in entries {
        zw.start_file(*name, SimpleFileOptions::default()).unwrap();
        zw.write_all(body.as_bytes()).unwrap();
    }
    zw.finish().unwrap().into_inner()
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 1, d).unwrap()
}

/// Two hourly Huobi rows for the given day of January 2021.
fn huobi_rows(d: u32) -> String {
    let base = 1_609_430_400 + (d as i64 - 1) * 86_400;
    format!(
        "{},1.0,1.1,1.2,0.9,100.0,110.0,7\n{},1.1,1.2,1.3,1.0,200.0,220.0,8\n",
        base,
        base + 3600
    )
}

fn huobi_config(data_dir: &Path, workers: usize) -> RunConfig {
    let mut config = RunConfig::default_for(Exchange::Huobi);
    config.data_dir = data_dir.to_path_buf();
    config.workers = workers;
    config.timezone = "+08:00".parse().unwrap();
    let source = config.exchange.source_mut();
    source.base_url = "http://fixtures.invalid/".into();
    source.start = "2021-01-01 00:00:00".into();
    source.end = "2021-01-05 00:00:00".into();
    config
}

fn archive_url(config: &RunConfig, d: u32) -> String {
    config.exchange.source().archive_url(day(d))
}

fn csv_name(d: u32) -> String {
    format!("FILUSDT-60min-2021-01-{d:02}.csv")
}

/// Days 1, 2 and 4 available; day 3 missing upstream.
fn standard_fixtures(config: &RunConfig) -> FixtureSource {
    let mut source = FixtureSource::default();
    for d in [1, 2, 4] {
        source = source.with(
            archive_url(config, d),
            zip_bytes(&[(csv_name(d).as_str(), huobi_rows(d).as_str())]),
        );
    }
    source
}

fn expected_merged(days: &[u32]) -> String {
    let mut text = format!("{BOM}{}\n", HUOBI_HEADER.join(","));
    for d in days {
        text.push_str(&huobi_rows(*d));
    }
    text
}

#[test]
fn merges_available_days_in_order_and_skips_missing_ones() {
    let dir = tempfile::tempdir().unwrap();
    let config = huobi_config(dir.path(), 1);
    let source = standard_fixtures(&config);

    let summary = run_crawl(&config, &source, &NullObserver).unwrap();

    // Every day is visited exactly once, in order, despite the gap.
    let expected_urls: Vec<String> = (1..=4).map(|d| archive_url(&config, d)).collect();
    assert_eq!(source.requested(), expected_urls);

    assert_eq!(summary.days_total, 4);
    assert_eq!(summary.days_merged, 3);
    assert_eq!(summary.days_failed, 1);
    assert_eq!(summary.failed_days[0].day, day(3));
    assert!(summary.failed_days[0].error.contains("404"));
    assert_eq!(summary.rows_written, 6);
    assert!(!summary.all_succeeded());

    let merged = std::fs::read_to_string(config.merged_path()).unwrap();
    assert_eq!(merged, expected_merged(&[1, 2, 4]));

    // Raw artifacts are left on disk.
    assert!(dir.path().join("FILUSDT-60min-2021-01-01.zip").exists());
    assert!(dir.path().join(csv_name(1)).exists());
}

#[test]
fn parallel_workers_produce_the_same_file() {
    let seq_dir = tempfile::tempdir().unwrap();
    let par_dir = tempfile::tempdir().unwrap();

    let seq_config = huobi_config(seq_dir.path(), 1);
    let par_config = huobi_config(par_dir.path(), 3);

    let seq = run_crawl(&seq_config, &standard_fixtures(&seq_config), &NullObserver).unwrap();
    let par = run_crawl(&par_config, &standard_fixtures(&par_config), &NullObserver).unwrap();

    assert_eq!(seq.rows_written, par.rows_written);
    assert_eq!(seq.days_failed, par.days_failed);
    assert_eq!(
        std::fs::read(seq_config.merged_path()).unwrap(),
        std::fs::read(par_config.merged_path()).unwrap()
    );
}

/// Eight days that all ship their rows as `kline.csv`.
fn colliding_fixtures(config: &RunConfig) -> (FixtureSource, String) {
    let mut source = FixtureSource::default();
    let mut rows_in_order = String::new();
    for d in 1..=8u32 {
        let base = 1_609_430_400 + (d as i64 - 1) * 86_400;
        let body: String = (0..5_000i64)
            .map(|i| format!("{},{d},{d},{d},{d},{i},{i},{d}\n", base + i))
            .collect();
        source = source.with(archive_url(config, d), zip_bytes(&[("kline.csv", body.as_str())]));
        rows_in_order.push_str(&body);
    }
    (source, rows_in_order)
}

#[test]
fn parallel_workers_keep_day_order_when_entry_names_collide() {
    let seq_dir = tempfile::tempdir().unwrap();
    let par_dir = tempfile::tempdir().unwrap();

    let mut seq_config = huobi_config(seq_dir.path(), 1);
    let mut par_config = huobi_config(par_dir.path(), 4);
    for config in [&mut seq_config, &mut par_config] {
        config.exchange.source_mut().end = "2021-01-09 00:00:00".into();
    }

    let (seq_source, rows_in_order) = colliding_fixtures(&seq_config);
    let (par_source, _) = colliding_fixtures(&par_config);

    let seq = run_crawl(&seq_config, &seq_source, &NullObserver).unwrap();
    let par = run_crawl(&par_config, &par_source, &NullObserver).unwrap();

    assert_eq!(seq.rows_written, 40_000);
    assert_eq!(par.rows_written, 40_000);
    assert_eq!(par.days_merged, 8);

    let expected = format!("{BOM}{}\n{rows_in_order}", HUOBI_HEADER.join(","));
    assert_eq!(std::fs::read_to_string(seq_config.merged_path()).unwrap(), expected);
    assert_eq!(std::fs::read_to_string(par_config.merged_path()).unwrap(), expected);
}

#[test]
fn observer_sees_each_day_once_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let config = huobi_config(dir.path(), 2);
    let observer = RecordingObserver::default();

    run_crawl(&config, &standard_fixtures(&config), &observer).unwrap();

    let days = observer.days.lock().unwrap().clone();
    assert_eq!(
        days,
        vec![(day(1), true), (day(2), true), (day(3), false), (day(4), true)]
    );
}

#[test]
fn tainted_archive_fails_only_its_day() {
    let root = tempfile::tempdir().unwrap();
    let data_dir = root.path().join("data");
    std::fs::create_dir_all(&data_dir).unwrap();
    let config = huobi_config(&data_dir, 1);

    let source = standard_fixtures(&config).with(
        archive_url(&config, 3),
        zip_bytes(&[("../escape.csv", "1,2,3,4,5,6,7,8\n")]),
    );

    let summary = run_crawl(&config, &source, &NullObserver).unwrap();

    assert!(!root.path().join("escape.csv").exists());
    assert_eq!(summary.days_failed, 1);
    assert!(summary.failed_days[0].error.contains("illegal file path"));
    assert_eq!(
        std::fs::read_to_string(config.merged_path()).unwrap(),
        expected_merged(&[1, 2, 4])
    );
}

#[test]
fn corrupt_archive_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let config = huobi_config(dir.path(), 1);
    let source = standard_fixtures(&config).with(
        archive_url(&config, 3),
        b"<Error><Code>NoSuchKey</Code></Error>".to_vec(),
    );

    let summary = run_crawl(&config, &source, &NullObserver).unwrap();

    assert_eq!(summary.days_merged, 3);
    assert_eq!(summary.failed_days[0].day, day(3));
}

#[test]
fn unreadable_file_does_not_drop_its_siblings() {
    let dir = tempfile::tempdir().unwrap();
    let config = huobi_config(dir.path(), 1);
    let source = FixtureSource::default().with(
        archive_url(&config, 1),
        zip_bytes(&[
            ("a.csv", huobi_rows(1).as_str()),
            ("b.csv", "1,2,3\n4,5\n"),
            ("c.csv", huobi_rows(2).as_str()),
        ]),
    );

    let summary = run_crawl(&config, &source, &NullObserver).unwrap();

    assert_eq!(summary.days_merged, 1);
    assert_eq!(summary.files_merged, 2);
    assert_eq!(summary.files_unreadable, 1);
    assert_eq!(summary.rows_written, 4);
    assert_eq!(
        std::fs::read_to_string(config.merged_path()).unwrap(),
        expected_merged(&[1, 2])
    );
}

#[test]
fn rerun_overwrites_without_duplicating() {
    let dir = tempfile::tempdir().unwrap();
    let config = huobi_config(dir.path(), 1);

    run_crawl(&config, &standard_fixtures(&config), &NullObserver).unwrap();
    let first = std::fs::read_to_string(config.merged_path()).unwrap();
    run_crawl(&config, &standard_fixtures(&config), &NullObserver).unwrap();
    let second = std::fs::read_to_string(config.merged_path()).unwrap();

    assert_eq!(first, second);
    let header = HUOBI_HEADER.join(",");
    assert_eq!(second.lines().filter(|l| l.ends_with(&header)).count(), 1);
}

#[test]
fn missing_output_directory_is_fatal_before_any_fetch() {
    let dir = tempfile::tempdir().unwrap();
    let config = huobi_config(&dir.path().join("does-not-exist"), 1);
    let source = standard_fixtures(&config);

    let err = run_crawl(&config, &source, &NullObserver).unwrap_err();

    assert!(matches!(err, PipelineError::Output(_)), "{err:?}");
    assert!(source.requested().is_empty());
}

#[test]
fn zero_workers_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = huobi_config(dir.path(), 0);

    let err = run_crawl(&config, &FixtureSource::default(), &NullObserver).unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));
}

#[test]
fn huobi_run_writes_enriched_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = huobi_config(dir.path(), 1);
    let observer = RecordingObserver::default();

    let report = run(&config, &standard_fixtures(&config), &observer).unwrap();

    let decompose = report.decompose.expect("huobi decomposes by default");
    assert_eq!(decompose.rows_written, 6);
    assert_eq!(*observer.decomposed.lock().unwrap(), Some(6));

    let enriched = std::fs::read_to_string(config.enriched_path().unwrap()).unwrap();
    let mut lines = enriched.lines();
    assert_eq!(
        lines.next().unwrap(),
        format!("{BOM}{}", ENRICHED_HEADER.join(","))
    );
    // 1609430400 is 2021-01-01 00:00:00 at +08:00.
    assert_eq!(
        lines.next().unwrap(),
        "1609430400,2021-01-01 00:00:00,2021,1,1,0,1.0,1.1,1.2,0.9,100.0,110.0,7"
    );
    assert_eq!(lines.count(), 5);
}

#[test]
fn decompose_can_be_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = huobi_config(dir.path(), 1);
    if let klinefetch_runner::ExchangeConfig::Huobi(huobi) = &mut config.exchange {
        huobi.decompose = false;
    }

    let report = run(&config, &standard_fixtures(&config), &NullObserver).unwrap();

    assert!(report.decompose.is_none());
    assert!(!dir.path().join("huobi_1h_FILUSDT.csv").exists());
}

#[test]
fn bad_epoch_fails_the_run_but_keeps_the_merged_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = huobi_config(dir.path(), 1);
    let source = standard_fixtures(&config).with(
        archive_url(&config, 3),
        zip_bytes(&[(csv_name(3).as_str(), "not-a-number,1,2,3,4,5,6,7\n")]),
    );

    let err = run(&config, &source, &NullObserver).unwrap_err();

    assert!(matches!(err, PipelineError::Decompose(_)), "{err:?}");
    let merged = std::fs::read_to_string(config.merged_path()).unwrap();
    assert_eq!(merged.lines().count(), 1 + 7);

    // Enriched output stops after the last good row (days 1 and 2).
    let enriched = std::fs::read_to_string(config.enriched_path().unwrap()).unwrap();
    assert_eq!(enriched.lines().count(), 1 + 4);
}

#[test]
fn binance_run_has_no_decompose_stage() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = RunConfig::default_for(Exchange::Binance);
    config.data_dir = dir.path().to_path_buf();
    let kline = config.exchange.source_mut();
    kline.base_url = "http://fixtures.invalid/".into();
    kline.start = "2021-01-01 00:00:00".into();
    kline.end = "2021-01-02 00:00:00".into();

    let row = "1609459200000,29000.0,29100.0,28900.0,29050.0,10.5,1609462799999,305000.0,120,5.2,151000.0,0\n";
    let source = FixtureSource::default().with(
        config.exchange.source().archive_url(day(1)),
        zip_bytes(&[("FILUSDT-1h-2021-01-01.csv", row)]),
    );

    let report = run(&config, &source, &NullObserver).unwrap();

    assert!(report.decompose.is_none());
    assert_eq!(report.crawl.rows_written, 1);
    let merged = std::fs::read_to_string(config.merged_path()).unwrap();
    assert_eq!(merged, format!("{BOM}{}\n{row}", BINANCE_HEADER.join(",")));
}

#[test]
fn summary_serializes_failed_days() {
    let dir = tempfile::tempdir().unwrap();
    let config = huobi_config(dir.path(), 1);

    let report = run(&config, &standard_fixtures(&config), &NullObserver).unwrap();
    let json: serde_json::Value = serde_json::to_value(&report).unwrap();

    assert_eq!(json["crawl"]["exchange"], "huobi");
    assert_eq!(json["crawl"]["rows_written"], 6);
    assert_eq!(json["crawl"]["failed_days"][0]["day"], "2021-01-03");
    assert_eq!(json["decompose"]["rows_written"], 6);
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        /// Whatever subset of days is published, every day is requested once in order
        /// and the merged file holds exactly the published days' rows in day order.
        #[test]
        fn merged_rows_follow_available_days(available in proptest::collection::vec(any::<bool>(), 4), workers in 1usize..4) {
            let dir = tempfile::tempdir().unwrap();
            let config = huobi_config(dir.path(), workers);

            let mut source = FixtureSource::default();
            let mut published = Vec::new();
            for (i, present) in available.iter().enumerate() {
                let d = i as u32 + 1;
                if *present {
                    source = source.with(
                        archive_url(&config, d),
                        zip_bytes(&[(csv_name(d).as_str(), huobi_rows(d).as_str())]),
                    );
                    published.push(d);
                }
            }

            let summary = run_crawl(&config, &source, &NullObserver).unwrap();

            let mut requested = source.requested();
            if workers > 1 {
                requested.sort();
            }
            let expected_urls: Vec<String> = (1..=4).map(|d| archive_url(&config, d)).collect();
            prop_assert_eq!(requested, expected_urls);
            prop_assert_eq!(summary.days_merged, published.len());
            prop_assert_eq!(summary.rows_written, 2 * published.len() as u64);
            prop_assert_eq!(
                std::fs::read_to_string(config.merged_path()).unwrap(),
                expected_merged(&published)
            );
        }
    }
}
