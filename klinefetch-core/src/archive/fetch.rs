//! Archive fetcher.
//!
//! The `ArchiveSource` trait abstracts over where daily archives come from, so the
//! pipeline can run against fixtures in tests. `HttpArchiveSource` is the real
//! implementation: one GET per archive with the body streamed straight to disk.
//!
//! There are no retries and no resume. A failed fetch means the day is unavailable.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors from fetching a single archive.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("request failed for {url}: {message}")]
    Transport { url: String, message: String },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Source of daily archives.
///
/// Implementations write the archive at `url` into `dest`, replacing whatever was
/// there, and return the number of bytes written.
pub trait ArchiveSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch `url` into `dest`.
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64, FetchError>;
}

/// Plain HTTP(S) archive source backed by a blocking reqwest client.
pub struct HttpArchiveSource {
    client: reqwest::blocking::Client,
}

impl HttpArchiveSource {
    /// Build a source with an optional whole-request timeout.
    ///
    /// `None` means no timeout at all: a hanging server blocks the run.
    pub fn new(timeout: Option<Duration>) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    /// Wrap an already configured client.
    pub fn with_client(client: reqwest::blocking::Client) -> Self {
        Self { client }
    }
}

impl ArchiveSource for HttpArchiveSource {
    fn name(&self) -> &str {
        "http"
    }

    fn fetch(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let mut resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| FetchError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let io_err = |source| FetchError::Io {
            path: dest.to_path_buf(),
            source,
        };

        let file = File::create(dest).map_err(io_err)?;
        let mut out = BufWriter::new(file);
        let written = resp.copy_to(&mut out).map_err(|e| FetchError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        out.flush().map_err(io_err)?;

        Ok(written)
    }
}
