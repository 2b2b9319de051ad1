//! Archive acquisition: download daily zips and unpack them safely.

pub mod extract;
pub mod fetch;

pub use extract::{extract, ExtractError};
pub use fetch::{ArchiveSource, FetchError, HttpArchiveSource};
