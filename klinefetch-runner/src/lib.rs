//! klinefetch runner: crawl orchestration on top of `klinefetch-core`.
//!
//! - Runtime configuration (TOML) with the exchange as a tagged union
//! - Sequential or batch-parallel day pipeline with ordered merge
//! - Observer capability for progress and per-day failures
//! - Run summaries (serializable for `--summary-json`)

pub mod config;
pub mod observer;
pub mod pipeline;

pub use config::{BinanceConfig, ConfigError, ExchangeConfig, HuobiConfig, RunConfig};
pub use observer::{NullObserver, PipelineObserver, TracingObserver};
pub use pipeline::{
    run, run_crawl, DayError, DayOutcome, DayReport, FailedDay, MergeSummary, PipelineError,
    RunReport,
};
