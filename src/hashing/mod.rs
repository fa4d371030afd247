//! Content hashing primitives: cheap fingerprints, streaming deep hashes, and
//! sequence manifest hashes.
//!
//! Every digest is rendered as `<algo>:<hex>` so consumers can tell which
//! algorithm produced it. BLAKE3 is the canonical algorithm; SHA-256 is the
//! fallback and remains accepted in stored hashes.

#![allow(missing_docs)]

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::errors::{QcError, Result};

pub mod cache;

/// Streaming read chunk size for deep hashing.
const CHUNK_SIZE: usize = 1024 * 1024;

/// Digest algorithm used for deep and manifest hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashAlgo {
    #[default]
    Blake3,
    Sha256,
}

impl HashAlgo {
    /// The `<algo>` prefix carried by rendered hashes.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Blake3 => "blake3",
            Self::Sha256 => "sha256",
        }
    }
}

impl fmt::Display for HashAlgo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Byte-free change detector for a set of files: count, total size, and the
/// newest mtime. Equal fingerprints mean "certainly unchanged" for the skip
/// path; they never prove change by themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CheapFingerprint {
    pub files: u64,
    pub bytes: u64,
    pub newest_mtime: i64,
}

impl CheapFingerprint {
    /// Pure reduction over `(size, mtime)` pairs.
    #[must_use]
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (u64, i64)>,
    {
        let mut fp = Self::default();
        for (size, mtime) in entries {
            fp.files += 1;
            fp.bytes += size;
            if mtime > fp.newest_mtime {
                fp.newest_mtime = mtime;
            }
        }
        fp
    }
}

/// Streaming digest over one of the supported algorithms.
enum Hasher {
    Blake3(Box<blake3::Hasher>),
    Sha256(Sha256),
}

impl Hasher {
    fn new(algo: HashAlgo) -> Self {
        match algo {
            HashAlgo::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
            HashAlgo::Sha256 => Self::Sha256(Sha256::new()),
        }
    }

    fn update(&mut self, bytes: &[u8]) {
        match self {
            Self::Blake3(h) => {
                h.update(bytes);
            }
            Self::Sha256(h) => h.update(bytes),
        }
    }

    fn finish(self, algo: HashAlgo) -> String {
        let hex = match self {
            Self::Blake3(h) => h.finalize().to_hex().to_string(),
            Self::Sha256(h) => {
                let digest = h.finalize();
                let mut out = String::with_capacity(digest.len() * 2);
                for byte in digest {
                    use std::fmt::Write;
                    let _ = write!(out, "{byte:02x}");
                }
                out
            }
        };
        format!("{}:{hex}", algo.prefix())
    }
}

/// Hash a byte slice. Used for manifest hashes and tests.
#[must_use]
pub fn hash_bytes(algo: HashAlgo, bytes: &[u8]) -> String {
    let mut hasher = Hasher::new(algo);
    hasher.update(bytes);
    hasher.finish(algo)
}

/// Deep content hash of a file, read in fixed-size chunks.
///
/// An unreadable file surfaces as an IO error; the caller treats the frame as
/// absent for this run.
pub fn deep_hash(algo: HashAlgo, path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| QcError::io(path, e))?;
    let mut hasher = Hasher::new(algo);
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf).map_err(|e| QcError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finish(algo))
}

/// Manifest hash over frame hashes in ascending frame order: the deep hash of
/// the UTF-8 concatenation `h1 "\n" h2 "\n" ...`.
///
/// Order is the caller's responsibility (integer frame ascending, filename
/// tiebreak), which makes the result independent of filesystem listing order.
#[must_use]
pub fn manifest_hash<S: AsRef<str>>(algo: HashAlgo, frame_hashes: &[S]) -> String {
    let mut joined = String::new();
    for h in frame_hashes {
        joined.push_str(h.as_ref());
        joined.push('\n');
    }
    hash_bytes(algo, joined.as_bytes())
}
