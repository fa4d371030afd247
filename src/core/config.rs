//! Run configuration: CLI flags + env var overrides + defaults.
//!
//! Everything the crawl needs is resolved once at startup into a [`RunConfig`]
//! and passed explicitly to the sidecar store, state builder, and engine. No
//! process-wide singletons.

#![allow(missing_docs)]

use std::collections::BTreeSet;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::core::errors::{QcError, Result};
use crate::core::paths::resolve_absolute_path;
use crate::hashing::HashAlgo;
use crate::sidecar::schema::QcResult;

/// Tool identity embedded in every sidecar (`tool_version`).
pub const TOOL_VERSION: &str = concat!("qc-crawl/", env!("CARGO_PKG_VERSION"));

/// Default semantic QC policy revision. Bumping it forces re-QC.
pub const DEFAULT_POLICY_VERSION: &str = "2025.11.0";

/// Extensions accepted as sequence frames (lowercase, no dot).
pub const SEQ_EXTS: &[&str] = &["exr", "dpx", "jpg", "jpeg", "png", "tif", "tiff"];

/// Additional single-file media extensions (lowercase, no dot).
pub const SINGLE_EXTS: &[&str] = &["mxf", "wav", "aif", "aiff", "mov", "mp4"];

/// Where sidecars are written relative to their asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SidecarMode {
    /// Next to the asset: `clip.mxf.qc.json` / `qc.sequence.json`.
    Inline,
    /// As `inline`, dot-prefixed (hidden on POSIX).
    Dot,
    /// Under a `.qc/` directory in the media directory.
    #[default]
    Subdir,
}

impl FromStr for SidecarMode {
    type Err = QcError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "inline" => Ok(Self::Inline),
            "dot" => Ok(Self::Dot),
            "subdir" => Ok(Self::Subdir),
            other => Err(QcError::InvalidConfig {
                details: format!("unknown sidecar mode {other:?} (inline|dot|subdir)"),
            }),
        }
    }
}

impl fmt::Display for SidecarMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Inline => "inline",
            Self::Dot => "dot",
            Self::Subdir => "subdir",
        })
    }
}

/// Tracker connection settings; presence enables the tracker.
#[derive(Debug, Clone)]
pub struct TrackerSettings {
    pub base_url: String,
    pub api_token: Option<String>,
    pub timeout: Duration,
}

/// Values collected from the command line before env/default resolution.
///
/// Kept free of clap types so the resolution logic is testable without a
/// parsed CLI.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub roots: Vec<PathBuf>,
    pub asset_ids: Vec<String>,
    pub workers: Option<usize>,
    pub min_seq: Option<usize>,
    pub sidecar_mode: Option<SidecarMode>,
    pub result: Option<QcResult>,
    pub operator: Option<String>,
    pub note: Option<String>,
    pub tracker_enabled: bool,
    pub tracker_url: Option<String>,
    pub tracker_token: Option<String>,
}

/// Fully resolved run configuration.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Crawl roots, absolute, in CLI order.
    pub roots: Vec<PathBuf>,
    /// Per-root tracker asset id, positionally paired with `roots`.
    pub asset_ids: Vec<Option<String>>,
    pub workers: usize,
    pub min_seq: usize,
    pub sidecar_mode: SidecarMode,
    /// `Some(pass|fail)` marks an operator sign-off run. `Some(pending)` and
    /// `None` both behave as nightly runs.
    pub result_override: Option<QcResult>,
    pub operator: String,
    pub note: Option<String>,
    pub policy_version: String,
    pub schema_name: String,
    pub schema_version: String,
    /// Suffix appended to single-file names, e.g. `.qc.json`.
    pub side_suffix: String,
    /// Sequence sidecar filename, e.g. `qc.sequence.json`.
    pub sequence_sidecar_name: String,
    /// Per-directory hash cache filename, e.g. `.qc.hashcache.json`.
    pub hashcache_name: String,
    pub seq_exts: BTreeSet<String>,
    pub media_exts: BTreeSet<String>,
    pub algo: HashAlgo,
    pub tracker: Option<TrackerSettings>,
}

impl RunConfig {
    /// Resolve CLI overrides against the environment and defaults, then
    /// validate. The only entry point for building a config.
    pub fn resolve(cli: CliOverrides) -> Result<Self> {
        Self::resolve_from(cli, env_var)
    }

    /// As [`resolve`](Self::resolve) with an injectable env lookup for tests.
    pub fn resolve_from<F>(cli: CliOverrides, mut lookup: F) -> Result<Self>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let roots: Vec<PathBuf> = cli
            .roots
            .iter()
            .map(|r| resolve_absolute_path(r))
            .collect();

        let asset_ids = pair_asset_ids(&cli.asset_ids, roots.len())?;

        let operator = cli
            .operator
            .or_else(|| lookup("USER"))
            .or_else(|| lookup("USERNAME"))
            .unwrap_or_else(|| "system".to_string());

        let algo = match lookup("QC_HASH_ALGO").as_deref() {
            None | Some("blake3") => HashAlgo::Blake3,
            Some("sha256") => HashAlgo::Sha256,
            Some(other) => {
                return Err(QcError::ConfigParse {
                    context: "env",
                    details: format!("QC_HASH_ALGO={other:?}: expected blake3 or sha256"),
                });
            }
        };

        let tracker_url = cli.tracker_url.or_else(|| lookup("TRAK_BASE_URL"));
        let tracker_token = cli
            .tracker_token
            .or_else(|| lookup("TRAK_ASSET_TRACKER_API_KEY"));
        let tracker = match (cli.tracker_enabled, tracker_url) {
            (_, Some(url)) => Some(TrackerSettings {
                base_url: url.trim_end_matches('/').to_string(),
                api_token: tracker_token,
                timeout: tracker_timeout(&mut lookup)?,
            }),
            (true, None) => {
                return Err(QcError::InvalidConfig {
                    details: "--trak requested but no tracker URL (use --trak-url or TRAK_BASE_URL)"
                        .to_string(),
                });
            }
            (false, None) => None,
        };

        let seq_exts: BTreeSet<String> = SEQ_EXTS.iter().map(|e| (*e).to_string()).collect();
        let media_exts: BTreeSet<String> = seq_exts
            .iter()
            .cloned()
            .chain(SINGLE_EXTS.iter().map(|e| (*e).to_string()))
            .collect();

        let cfg = Self {
            roots,
            asset_ids,
            workers: cli.workers.unwrap_or_else(default_workers),
            min_seq: cli.min_seq.unwrap_or(2),
            sidecar_mode: cli.sidecar_mode.unwrap_or_default(),
            result_override: cli.result,
            operator,
            note: cli.note,
            policy_version: lookup("QC_POLICY_VERSION")
                .unwrap_or_else(|| DEFAULT_POLICY_VERSION.to_string()),
            schema_name: lookup("QC_SCHEMA_NAME")
                .unwrap_or_else(|| crate::sidecar::migrate::SCHEMA_NAME.to_string()),
            schema_version: lookup("QC_SCHEMA_VERSION")
                .unwrap_or_else(|| crate::sidecar::migrate::SCHEMA_VERSION.to_string()),
            side_suffix: lookup("QC_SIDE_SUFFIX_FILE").unwrap_or_else(|| ".qc.json".to_string()),
            sequence_sidecar_name: lookup("QC_SIDE_NAME_SEQUENCE")
                .unwrap_or_else(|| "qc.sequence.json".to_string()),
            hashcache_name: lookup("QC_HASHCACHE_NAME")
                .unwrap_or_else(|| ".qc.hashcache.json".to_string()),
            seq_exts,
            media_exts,
            algo,
            tracker,
        };

        cfg.validate()?;
        Ok(cfg)
    }

    /// Whether this run records an operator verdict (mints a fresh qc_id).
    #[must_use]
    pub fn is_operator_run(&self) -> bool {
        matches!(
            self.result_override,
            Some(QcResult::Pass) | Some(QcResult::Fail)
        )
    }

    /// Asset id paired with the root at `index` (last id covers the tail).
    #[must_use]
    pub fn asset_id_for_root(&self, index: usize) -> Option<&str> {
        self.asset_ids.get(index).and_then(Option::as_deref)
    }

    fn validate(&self) -> Result<()> {
        if self.roots.is_empty() {
            return Err(QcError::InvalidConfig {
                details: "at least one crawl root is required".to_string(),
            });
        }
        if self.workers == 0 {
            return Err(QcError::InvalidConfig {
                details: "workers must be >= 1".to_string(),
            });
        }
        if self.min_seq < 2 {
            return Err(QcError::InvalidConfig {
                details: format!("min_seq must be >= 2, got {}", self.min_seq),
            });
        }
        if !self.side_suffix.starts_with('.') {
            return Err(QcError::InvalidConfig {
                details: format!(
                    "sidecar suffix must start with '.', got {:?}",
                    self.side_suffix
                ),
            });
        }
        if self.sequence_sidecar_name.is_empty() || self.sequence_sidecar_name.contains('/') {
            return Err(QcError::InvalidConfig {
                details: format!(
                    "sequence sidecar name must be a bare filename, got {:?}",
                    self.sequence_sidecar_name
                ),
            });
        }
        if self.hashcache_name.is_empty() || self.hashcache_name.contains('/') {
            return Err(QcError::InvalidConfig {
                details: format!(
                    "hash cache name must be a bare filename, got {:?}",
                    self.hashcache_name
                ),
            });
        }
        Ok(())
    }
}

/// Pair repeated `--asset-id` values positionally with roots. Fewer ids than
/// roots: the last id covers the remaining roots. More ids than roots is a
/// configuration error.
fn pair_asset_ids(ids: &[String], root_count: usize) -> Result<Vec<Option<String>>> {
    if ids.len() > root_count {
        return Err(QcError::InvalidConfig {
            details: format!(
                "{} --asset-id values for {} root(s)",
                ids.len(),
                root_count
            ),
        });
    }
    let mut paired: Vec<Option<String>> = Vec::with_capacity(root_count);
    for i in 0..root_count {
        let id = ids.get(i).or_else(|| ids.last()).cloned();
        paired.push(id);
    }
    Ok(paired)
}

fn tracker_timeout<F>(lookup: &mut F) -> Result<Duration>
where
    F: FnMut(&str) -> Option<String>,
{
    let secs = match lookup("TRAK_TIMEOUT_SECONDS") {
        Some(raw) => raw.parse::<u64>().map_err(|error| QcError::ConfigParse {
            context: "env",
            details: format!("TRAK_TIMEOUT_SECONDS={raw:?}: {error}"),
        })?,
        None => 10,
    };
    Ok(Duration::from_secs(secs))
}

fn default_workers() -> usize {
    std::thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get)
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}
