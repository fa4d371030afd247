//! Serial directory producer.
//!
//! Walks crawl roots depth-first with sorted entries so traversal order is
//! predictable and memory stays bounded to one directory listing at a time.
//! Hidden directories and hidden files are skipped; `.qc/` subdirectories are
//! reached explicitly by the sidecar store, never by the walk.

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use tracing::warn;

use crate::core::errors::Result;

/// One media file discovered in a directory, with the metadata the hashing
/// pipeline needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaEntry {
    pub path: PathBuf,
    pub file_name: String,
    /// Lowercased extension without the dot.
    pub ext: String,
    pub size: u64,
    /// Modification time as seconds since the epoch.
    pub mtime: i64,
}

/// A directory visited by the walk and its media listing. The listing may be
/// empty; directories without media still need missing-sidecar
/// reconciliation.
#[derive(Debug, Clone)]
pub struct DirectoryBatch {
    pub dir: PathBuf,
    pub media: Vec<MediaEntry>,
}

/// Walk `root` and invoke `visit` once per directory, parents before
/// children. Stops early when `visit` returns `false` (interrupt drain).
pub fn walk_root<F>(root: &Path, media_exts: &BTreeSet<String>, visit: &mut F) -> Result<bool>
where
    F: FnMut(DirectoryBatch) -> Result<bool>,
{
    walk_dir(root, media_exts, visit)
}

fn walk_dir<F>(dir: &Path, media_exts: &BTreeSet<String>, visit: &mut F) -> Result<bool>
where
    F: FnMut(DirectoryBatch) -> Result<bool>,
{
    let read = match fs::read_dir(dir) {
        Ok(read) => read,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(true),
        Err(err) if err.kind() == ErrorKind::PermissionDenied => {
            warn!(dir = %dir.display(), "permission denied, skipping directory");
            return Ok(true);
        }
        Err(err) => {
            warn!(dir = %dir.display(), error = %err, "unreadable directory, skipping");
            return Ok(true);
        }
    };

    let mut media = Vec::new();
    let mut subdirs = Vec::new();

    for entry in read {
        let Ok(entry) = entry else {
            continue;
        };
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }

        // symlink_metadata so symlinked trees are never followed.
        let Ok(meta) = fs::symlink_metadata(entry.path()) else {
            continue;
        };
        if meta.file_type().is_symlink() {
            continue;
        }

        if meta.is_dir() {
            subdirs.push(entry.path());
            continue;
        }
        if !meta.is_file() {
            continue;
        }

        let Some(ext) = extension_of(&name) else {
            continue;
        };
        if !media_exts.contains(&ext) {
            continue;
        }

        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX));

        media.push(MediaEntry {
            path: entry.path(),
            file_name: name,
            ext,
            size: meta.len(),
            mtime,
        });
    }

    media.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    subdirs.sort();

    if !visit(DirectoryBatch {
        dir: dir.to_path_buf(),
        media,
    })? {
        return Ok(false);
    }

    for sub in subdirs {
        if !walk_dir(&sub, media_exts, visit)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn extension_of(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
