//! Safe zip extraction.
//!
//! Every entry is resolved against the destination directory and must land strictly
//! inside it. One offending entry fails the whole archive ("zip-slip" guard).
//! Entries already written before a failure stay on disk.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use zip::result::ZipError;
use zip::ZipArchive;

/// Errors from extracting a single archive.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("{}: illegal file path", .path.display())]
    IllegalPath { path: PathBuf },

    #[error("failed to open archive {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt archive {}: {source}", .path.display())]
    Zip {
        path: PathBuf,
        #[source]
        source: ZipError,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Extract every entry of `archive_path` into `dest_dir`.
///
/// Returns the cleaned destination path of every entry in archive order,
/// directories included.
pub fn extract(archive_path: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    let file = File::open(archive_path).map_err(|source| ExtractError::Open {
        path: archive_path.to_path_buf(),
        source,
    })?;
    let zip_err = |source| ExtractError::Zip {
        path: archive_path.to_path_buf(),
        source,
    };
    let mut archive = ZipArchive::new(file).map_err(zip_err)?;

    let root = clean_path(dest_dir);
    let mut extracted = Vec::with_capacity(archive.len());

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(zip_err)?;

        let target = clean_path(&dest_dir.join(entry.name()));
        if !is_contained(&root, &target) {
            return Err(ExtractError::IllegalPath { path: target });
        }
        extracted.push(target.clone());

        let io_err = |source| ExtractError::Io {
            path: target.clone(),
            source,
        };

        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(io_err)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let mut opts = OpenOptions::new();
        opts.write(true).create(true).truncate(true);
        apply_mode(&mut opts, entry.unix_mode());

        let mut out = opts.open(&target).map_err(io_err)?;
        io::copy(&mut entry, &mut out).map_err(io_err)?;
    }

    Ok(extracted)
}

#[cfg(unix)]
fn apply_mode(opts: &mut OpenOptions, mode: Option<u32>) {
    use std::os::unix::fs::OpenOptionsExt;
    if let Some(mode) = mode {
        let perms = mode & 0o7777;
        if perms != 0 {
            opts.mode(perms);
        }
    }
}

#[cfg(not(unix))]
fn apply_mode(_opts: &mut OpenOptions, _mode: Option<u32>) {}

/// Lexically normalise a path: drop `.` components and fold `..` into the
/// preceding component. Leading `..` on a relative path is kept; `..` directly
/// under the root is dropped.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut parts: Vec<Component> = Vec::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => parts.push(comp),
            },
            other => parts.push(other),
        }
    }
    parts.iter().collect()
}

/// True when `target` lies strictly below `root` (both already cleaned).
pub fn is_contained(root: &Path, target: &Path) -> bool {
    match target.strip_prefix(root) {
        Ok(rest) => matches!(rest.components().next(), Some(Component::Normal(_))),
        Err(_) => false,
    }
}
