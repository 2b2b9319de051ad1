//! Serializable run configuration.
//!
//! The exchange is a tagged union resolved once at startup. Everything else the
//! crawl needs (data directory, worker count, time zone) sits beside it.
//!
//! ```toml
//! data_dir = "./data"
//! workers = 1
//! timezone = "+08:00"
//!
//! [exchange]
//! kind = "huobi"
//! pair = "FILUSDT"
//! period = "60min"
//! base_url = "https://futures.huobi.com/data/klines/spot/daily/"
//! start = "2020-01-01 00:00:00"
//! end = "2022-09-06 00:00:00"
//! decompose = true
//! enriched_label = "1h"
//! ```

use klinefetch_core::calendar::CalendarError;
use klinefetch_core::{Exchange, KlineSource, TimeZoneSetting};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error(transparent)]
    Calendar(#[from] CalendarError),
}

/// Complete configuration for one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunConfig {
    /// Directory holding archives, extracted CSVs and outputs.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Days fetched concurrently. 1 keeps the crawl strictly sequential.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Per-request timeout. Absent means none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Zone used by the decomposition pass.
    #[serde(default)]
    pub timezone: TimeZoneSetting,

    pub exchange: ExchangeConfig,
}

/// Exchange selection with its exchange-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExchangeConfig {
    Huobi(HuobiConfig),
    Binance(BinanceConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HuobiConfig {
    #[serde(flatten)]
    pub source: KlineSource,

    /// Run the timestamp decomposition pass after the crawl.
    #[serde(default = "default_true")]
    pub decompose: bool,

    /// Period label in the enriched file name, `huobi_{label}_{pair}.csv`.
    #[serde(default = "default_enriched_label")]
    pub enriched_label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BinanceConfig {
    #[serde(flatten)]
    pub source: KlineSource,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_workers() -> usize {
    1
}

fn default_true() -> bool {
    true
}

fn default_enriched_label() -> String {
    "1h".into()
}

impl ExchangeConfig {
    /// Historical settings for `exchange`.
    pub fn default_for(exchange: Exchange) -> Self {
        let source = exchange.default_source();
        match exchange {
            Exchange::Huobi => Self::Huobi(HuobiConfig {
                source,
                decompose: true,
                enriched_label: default_enriched_label(),
            }),
            Exchange::Binance => Self::Binance(BinanceConfig { source }),
        }
    }

    pub fn exchange(&self) -> Exchange {
        match self {
            Self::Huobi(_) => Exchange::Huobi,
            Self::Binance(_) => Exchange::Binance,
        }
    }

    pub fn source(&self) -> &KlineSource {
        match self {
            Self::Huobi(c) => &c.source,
            Self::Binance(c) => &c.source,
        }
    }

    pub fn source_mut(&mut self) -> &mut KlineSource {
        match self {
            Self::Huobi(c) => &mut c.source,
            Self::Binance(c) => &mut c.source,
        }
    }

    /// Whether the decomposition pass runs after the crawl.
    pub fn decompose_enabled(&self) -> bool {
        let requested = match self {
            Self::Huobi(c) => c.decompose,
            Self::Binance(_) => false,
        };
        requested && self.exchange().supports_decompose()
    }
}

impl RunConfig {
    /// Historical run for `exchange` with default directory and zone.
    pub fn default_for(exchange: Exchange) -> Self {
        Self {
            data_dir: default_data_dir(),
            workers: default_workers(),
            timeout_secs: None,
            timezone: TimeZoneSetting::Local,
            exchange: ExchangeConfig::default_for(exchange),
        }
    }

    /// Load and validate a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "timeout_secs must be positive; omit it for no timeout".into(),
            ));
        }
        self.exchange.source().range()?;
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// `{data_dir}/{exchange}_{pair}.csv`
    pub fn merged_path(&self) -> PathBuf {
        let source = self.exchange.source();
        self.data_dir
            .join(self.exchange.exchange().merged_file_name(&source.pair))
    }

    /// `{data_dir}/huobi_{label}_{pair}.csv`, when the decomposition pass is on.
    pub fn enriched_path(&self) -> Option<PathBuf> {
        match &self.exchange {
            ExchangeConfig::Huobi(c) if self.exchange.decompose_enabled() => Some(
                self.data_dir
                    .join(Exchange::Huobi.enriched_file_name(&c.source.pair, &c.enriched_label)),
            ),
            _ => None,
        }
    }
}
