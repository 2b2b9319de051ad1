//! klinefetch core: the leaf components of the daily kline archive pipeline.
//!
//! - Archive fetcher (streamed HTTP download behind the `ArchiveSource` trait)
//! - Safe zip extractor with a path-containment guard
//! - Daily range walker and archive URL/path derivation
//! - Merge sink that owns one growing CSV per exchange
//! - Timestamp decomposition pass over a merged file
//! - Exchange schemas (translated headers, file naming, default endpoints)

pub mod archive;
pub mod calendar;
pub mod decompose;
pub mod schema;
pub mod sink;

pub use archive::{extract, ArchiveSource, ExtractError, FetchError, HttpArchiveSource};
pub use calendar::{CalendarError, CalendarFields, DailyRange, TimeZoneSetting};
pub use decompose::{decompose, DecomposeError, DecomposeSummary};
pub use schema::{ArchiveRecord, Exchange, KlineSource};
pub use sink::{read_rows, MergeSink, SinkError, UTF8_BOM};
