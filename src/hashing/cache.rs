//! Per-directory persistent hash cache.
//!
//! Maps frame filename to `(size, mtime, content_hash)` so unchanged files are
//! never re-read. Advisory only: a full rebuild always yields the same
//! sidecars.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::atomicfile::write_atomic;
use crate::core::errors::Result;

/// One cached digest, valid while both `size` and `mtime` match exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub size: u64,
    pub mtime: i64,
    pub hash: String,
}

/// In-memory view of one directory's cache file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashCache {
    entries: BTreeMap<String, CacheEntry>,
}

impl HashCache {
    /// Load the cache file `dir/name`. Absence and corruption both yield an
    /// empty cache; corruption is logged.
    #[must_use]
    pub fn load(dir: &Path, name: &str) -> Self {
        let path = dir.join(name);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(_) => return Self::default(),
        };
        match serde_json::from_slice::<BTreeMap<String, CacheEntry>>(&raw) {
            Ok(entries) => Self { entries },
            Err(error) => {
                warn!(path = %path.display(), %error, "corrupt hash cache, rebuilding");
                Self::default()
            }
        }
    }

    /// The cached hash for `filename`, iff both size and mtime match exactly.
    #[must_use]
    pub fn lookup(&self, filename: &str, size: u64, mtime: i64) -> Option<&str> {
        self.entries
            .get(filename)
            .filter(|e| e.size == size && e.mtime == mtime)
            .map(|e| e.hash.as_str())
    }

    /// Record a freshly computed hash.
    pub fn update(&mut self, filename: &str, size: u64, mtime: i64, hash: String) {
        self.entries
            .insert(filename.to_string(), CacheEntry { size, mtime, hash });
    }

    /// Atomically persist the cache to `dir/name`.
    pub fn save(&self, dir: &Path, name: &str) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&self.entries)?;
        write_atomic(&dir.join(name), &bytes)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
