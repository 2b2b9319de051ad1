//! klinefetch CLI: crawl, decompose and config commands.
//!
//! Commands:
//! - `crawl`: download daily kline archives, merge them into one CSV and, for Huobi,
//!   write the timestamp-decomposed copy
//! - `decompose`: run the decomposition pass over an existing merged file
//! - `config`: print the default config for an exchange as TOML

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use klinefetch_core::{decompose, Exchange, HttpArchiveSource, TimeZoneSetting};
use klinefetch_runner::{run, ExchangeConfig, RunConfig, RunReport, TracingObserver};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(
    name = "klinefetch",
    about = "Download, merge and decompose daily exchange kline archives"
)]
struct Cli {
    /// Emit log events as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk a date range, fetch each day's archive and merge the rows.
    Crawl(CrawlArgs),
    /// Expand epoch ids of a merged Huobi file into calendar columns.
    Decompose {
        /// Merged Huobi CSV to read.
        #[arg(long)]
        input: PathBuf,

        /// Enriched CSV to write (overwritten).
        #[arg(long)]
        output: PathBuf,

        /// Zone for calendar fields: local, utc or an offset like +08:00.
        #[arg(long, default_value = "local")]
        timezone: TimeZoneSetting,
    },
    /// Print the default run config as TOML.
    Config {
        /// Exchange whose defaults to print.
        #[arg(long, default_value = "huobi")]
        exchange: Exchange,
    },
}

#[derive(Args)]
struct CrawlArgs {
    /// TOML config file. Flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// huobi or binance. Defaults to huobi without --config.
    #[arg(long)]
    exchange: Option<Exchange>,

    /// Trading pair, e.g. FILUSDT.
    #[arg(long)]
    pair: Option<String>,

    /// Kline period as named by the exchange (60min, 1h, ...).
    #[arg(long)]
    period: Option<String>,

    /// Range start, "YYYY-MM-DD HH:MM:SS".
    #[arg(long)]
    start: Option<String>,

    /// Range end (exclusive), "YYYY-MM-DD HH:MM:SS".
    #[arg(long)]
    end: Option<String>,

    /// Directory for archives, extracted files and outputs.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Days fetched concurrently.
    #[arg(long)]
    workers: Option<usize>,

    /// Zone for the decomposition pass: local, utc or an offset like +08:00.
    #[arg(long)]
    timezone: Option<TimeZoneSetting>,

    /// Per-request timeout in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Skip the decomposition pass.
    #[arg(long, default_value_t = false)]
    no_decompose: bool,

    /// Write the run report as JSON to this file.
    #[arg(long)]
    summary_json: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    match cli.command {
        Commands::Crawl(args) => run_crawl_cmd(args),
        Commands::Decompose {
            input,
            output,
            timezone,
        } => run_decompose_cmd(&input, &output, timezone),
        Commands::Config { exchange } => {
            print!("{}", RunConfig::default_for(exchange).to_toml()?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(fmt::layer))
        .init();
}

fn run_crawl_cmd(args: CrawlArgs) -> Result<()> {
    let config = resolve_config(&args)?;

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("failed to create {}", config.data_dir.display()))?;

    let source = HttpArchiveSource::new(config.timeout())?;
    let report = match run(&config, &source, &TracingObserver) {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "run aborted");
            return Err(e.into());
        }
    };

    if let Some(path) = &args.summary_json {
        write_summary(path, &report)?;
        info!(path = %path.display(), "wrote run summary");
    }

    let crawl = &report.crawl;
    if !crawl.all_succeeded() {
        warn!(
            days_failed = crawl.days_failed,
            files_unreadable = crawl.files_unreadable,
            "some days did not merge completely"
        );
    }
    Ok(())
}

/// Start from the config file (or exchange defaults) and apply flag overrides.
fn resolve_config(args: &CrawlArgs) -> Result<RunConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let config = RunConfig::from_file(path)?;
            if let Some(exchange) = args.exchange {
                if exchange != config.exchange.exchange() {
                    bail!(
                        "--exchange {exchange} conflicts with {} in {}",
                        config.exchange.exchange(),
                        path.display()
                    );
                }
            }
            config
        }
        None => RunConfig::default_for(args.exchange.unwrap_or(Exchange::Huobi)),
    };

    let source = config.exchange.source_mut();
    if let Some(pair) = &args.pair {
        source.pair = pair.clone();
    }
    if let Some(period) = &args.period {
        source.period = period.clone();
    }
    if let Some(start) = &args.start {
        source.start = start.clone();
    }
    if let Some(end) = &args.end {
        source.end = end.clone();
    }
    if let Some(data_dir) = &args.data_dir {
        config.data_dir = data_dir.clone();
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(timezone) = args.timezone {
        config.timezone = timezone;
    }
    if args.timeout_secs.is_some() {
        config.timeout_secs = args.timeout_secs;
    }
    if args.no_decompose {
        if let ExchangeConfig::Huobi(huobi) = &mut config.exchange {
            huobi.decompose = false;
        }
    }

    config.validate()?;
    Ok(config)
}

fn run_decompose_cmd(input: &Path, output: &Path, timezone: TimeZoneSetting) -> Result<()> {
    let summary = match decompose(input, output, timezone) {
        Ok(summary) => summary,
        Err(e) => {
            error!(input = %input.display(), error = %e, "decomposition failed");
            return Err(e.into());
        }
    };
    info!(
        source = %summary.source.display(),
        output = %summary.output.display(),
        rows_written = summary.rows_written,
        "timestamp decomposition complete"
    );
    Ok(())
}

fn write_summary(path: &Path, report: &RunReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
