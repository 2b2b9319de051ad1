//! Exchange schemas: translated headers, output naming, archive URL templates.
//!
//! Headers are fixed human-readable translations of each exchange's native kline
//! fields, not the upstream field names.

use crate::calendar::{CalendarError, DailyRange, DAY_FORMAT};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Huobi daily kline columns: id, open, close, high, low, amount, vol, count.
pub const HUOBI_HEADER: [&str; 8] = [
    "开盘时间",
    "开盘价",
    "收盘价",
    "最高价",
    "最低价",
    "以基础币种计量的交易量",
    "以报价币种计量的交易量",
    "交易次数",
];

/// Binance daily kline columns, in archive order.
pub const BINANCE_HEADER: [&str; 12] = [
    "k线开盘时间",
    "开盘价",
    "最高价",
    "最低价",
    "收盘价",
    "成交量",
    "k线收盘时间",
    "成交额",
    "成交笔数",
    "主动买入成交量",
    "主动买入成交额",
    "请忽略该参数",
];

/// Header of the decomposed (enriched) file.
pub const ENRICHED_HEADER: [&str; 13] = [
    "开盘时间戳",
    "开盘时间",
    "年",
    "月",
    "日",
    "小时",
    "开盘价",
    "收盘价",
    "最高价",
    "最低价",
    "以基础币种计量的交易量",
    "以报价币种计量的交易量",
    "交易次数",
];

/// Supported exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exchange {
    Huobi,
    Binance,
}

impl Exchange {
    pub const ALL: [Exchange; 2] = [Exchange::Huobi, Exchange::Binance];

    /// Lowercase identifier used in file names and config.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Huobi => "huobi",
            Self::Binance => "binance",
        }
    }

    /// Fixed header row of the merged file.
    pub fn merged_header(&self) -> &'static [&'static str] {
        match self {
            Self::Huobi => &HUOBI_HEADER,
            Self::Binance => &BINANCE_HEADER,
        }
    }

    /// `{exchange}_{pair}.csv`
    pub fn merged_file_name(&self, pair: &str) -> String {
        format!("{}_{pair}.csv", self.slug())
    }

    /// `{exchange}_{label}_{pair}.csv`. The label names the sampling period as
    /// downstream consumers expect it, which need not match the URL's period.
    pub fn enriched_file_name(&self, pair: &str, label: &str) -> String {
        format!("{}_{label}_{pair}.csv", self.slug())
    }

    /// Whether merged rows carry an epoch-seconds id in field 0 that the
    /// decomposition pass understands.
    pub fn supports_decompose(&self) -> bool {
        matches!(self, Self::Huobi)
    }

    /// The historical crawl parameters for this exchange.
    pub fn default_source(&self) -> KlineSource {
        match self {
            Self::Huobi => KlineSource {
                pair: "FILUSDT".into(),
                period: "60min".into(),
                base_url: "https://futures.huobi.com/data/klines/spot/daily/".into(),
                start: "2020-01-01 00:00:00".into(),
                end: "2022-09-06 00:00:00".into(),
            },
            Self::Binance => KlineSource {
                pair: "FILUSDT".into(),
                period: "1h".into(),
                base_url: "https://data.binance.vision/data/spot/daily/klines/".into(),
                start: "2020-01-01 00:00:00".into(),
                end: "2022-09-05 00:00:00".into(),
            },
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Exchange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "huobi" => Ok(Self::Huobi),
            "binance" => Ok(Self::Binance),
            other => Err(format!("unknown exchange '{other}'. Valid: huobi, binance")),
        }
    }
}

/// Where and over which days to fetch daily kline archives.
///
/// Pair and period are used verbatim in URLs and file names; a bad value just
/// shows up as failed downloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KlineSource {
    pub pair: String,
    pub period: String,
    pub base_url: String,
    /// Inclusive start, `YYYY-MM-DD HH:MM:SS` local time.
    pub start: String,
    /// Exclusive end, `YYYY-MM-DD HH:MM:SS` local time.
    pub end: String,
}

/// One day's unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRecord {
    pub day: NaiveDate,
    pub url: String,
    pub archive_path: PathBuf,
}

impl KlineSource {
    pub fn range(&self) -> Result<DailyRange, CalendarError> {
        DailyRange::parse(&self.start, &self.end)
    }

    /// `{pair}-{period}-{YYYY-MM-DD}.zip`
    pub fn archive_name(&self, day: NaiveDate) -> String {
        format!(
            "{}-{}-{}.zip",
            self.pair,
            self.period,
            day.format(DAY_FORMAT)
        )
    }

    /// `{base_url}{pair}/{period}/{pair}-{period}-{YYYY-MM-DD}.zip`
    pub fn archive_url(&self, day: NaiveDate) -> String {
        format!(
            "{}{}/{}/{}",
            self.base_url,
            self.pair,
            self.period,
            self.archive_name(day)
        )
    }

    pub fn archive_for(&self, day: NaiveDate, data_dir: &Path) -> ArchiveRecord {
        ArchiveRecord {
            day,
            url: self.archive_url(day),
            archive_path: data_dir.join(self.archive_name(day)),
        }
    }
}
