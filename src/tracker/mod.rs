//! External asset-tracker contract.
//!
//! The crawler only depends on this trait; the HTTP transport lives in
//! [`http`]. Tracker calls are best-effort: failures become
//! `tracker_status` entries in sidecars and never abort the crawl.

use std::fmt;
use std::path::Path;

use crate::sidecar::schema::{Sidecar, TrackerStatus};

pub mod http;

/// Classified outcome of a tracker call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTag {
    Ok,
    Unauthorized,
    NotFound,
    Error,
}

impl StatusTag {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Unauthorized => "unauthorized",
            Self::NotFound => "not_found",
            Self::Error => "error",
        }
    }

    /// Map an HTTP status code to its tag class.
    #[must_use]
    pub const fn from_http(code: u16) -> Self {
        match code {
            200..=299 => Self::Ok,
            401 | 403 => Self::Unauthorized,
            404 => Self::NotFound,
            _ => Self::Error,
        }
    }
}

impl fmt::Display for StatusTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of an asset lookup by path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupOutcome {
    pub asset_id: Option<String>,
    pub status: StatusTag,
    /// HTTP status code; absent on transport failures and timeouts.
    pub http_code: Option<u16>,
}

impl LookupOutcome {
    /// Sidecar wire form of this outcome.
    #[must_use]
    pub fn to_tracker_status(&self) -> TrackerStatus {
        TrackerStatus {
            http_code: self.http_code,
            status: self.status.as_str().to_string(),
        }
    }
}

/// Result of posting a QC verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostOutcome {
    pub status: StatusTag,
    pub http_code: Option<u16>,
}

impl PostOutcome {
    #[must_use]
    pub fn to_tracker_status(&self) -> TrackerStatus {
        TrackerStatus {
            http_code: self.http_code,
            status: self.status.as_str().to_string(),
        }
    }
}

/// Abstract tracker client.
///
/// Implementations must be callable from worker threads; internal state (the
/// auth-warning dedup set) is synchronized inside the implementation.
pub trait Tracker: Send + Sync {
    /// Look up the tracker asset registered for `asset_path`. Called at most
    /// once per asset per run.
    fn lookup(&self, asset_path: &Path) -> LookupOutcome;

    /// Post a finished QC verdict. Only called when `qc_result != pending`
    /// and an asset id is resolved.
    fn post_result(&self, asset_id: &str, sidecar: &Sidecar) -> PostOutcome;
}
