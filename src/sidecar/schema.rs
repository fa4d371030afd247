//! Typed sidecar record and its wire types.
//!
//! The sidecar is the tamper-evident QC audit record written next to each
//! asset. Serialization is canonical: keys are emitted in sorted order so
//! consecutive writes diff cleanly.

#![allow(missing_docs)]

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::errors::{QcError, Result};
use crate::hashing::CheapFingerprint;

/// QC verdict for an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QcResult {
    Pass,
    Fail,
    Pending,
}

impl fmt::Display for QcResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Pending => "pending",
        })
    }
}

impl FromStr for QcResult {
    type Err = QcError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pass" => Ok(Self::Pass),
            "fail" => Ok(Self::Fail),
            "pending" => Ok(Self::Pending),
            other => Err(QcError::InvalidConfig {
                details: format!("unknown QC result {other:?} (pass|fail|pending)"),
            }),
        }
    }
}

/// How the asset's bytes relate to the previous sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentState {
    New,
    Unchanged,
    Modified,
    Missing,
}

impl fmt::Display for ContentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::New => "new",
            Self::Unchanged => "unchanged",
            Self::Modified => "modified",
            Self::Missing => "missing",
        })
    }
}

/// Outcome of the most recent tracker interaction for this asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerStatus {
    /// HTTP status code; absent on transport failures.
    pub http_code: Option<u16>,
    /// Status tag: `ok`, `unauthorized`, `not_found`, or `error`.
    pub status: String,
}

/// Structured frame-range summary stored on sequence sidecars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceSummary {
    /// Filename stem up to the frame-number field.
    pub base: String,
    /// Lowercase extension without the dot.
    pub ext: String,
    /// Zero-padding width of the numeric field.
    pub pad: usize,
    /// Filename of the numerically lowest frame.
    pub first: String,
    /// Filename of the numerically highest frame.
    pub last: String,
    pub frame_min: u64,
    pub frame_max: u64,
    /// Number of frame files actually present.
    pub frame_count: u64,
    /// Maximal contiguous integer runs among present frames.
    pub range_count: u64,
    /// `(frame_max - frame_min + 1) - frame_count`, never negative.
    pub holes: u64,
    pub cheap_fp: CheapFingerprint,
}

/// Persistent QC record for one asset.
///
/// `sequence` is always serialized; `null` marks a single-file asset.
/// Optional history fields are omitted entirely when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sidecar {
    /// Stable QC event id; regenerated only on operator sign-off.
    pub qc_id: String,
    /// RFC3339 UTC wall time of this record.
    pub qc_time: String,
    pub qc_result: QcResult,
    pub operator: String,
    pub notes: String,
    pub tool_version: String,
    pub policy_version: String,
    pub schema_name: String,
    pub schema_version: String,
    pub asset_id: Option<String>,
    /// Absolute asset path: the file for singles, the directory for sequences.
    pub asset_path: String,
    /// `<algo>:<hex>` content hash.
    pub content_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_content_hash: Option<String>,
    pub content_state: ContentState,
    pub sequence: Option<SequenceSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_valid_qc_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_valid_qc_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracker_status: Option<TrackerStatus>,
}

impl Sidecar {
    /// Canonical serialized form: pretty JSON with sorted keys and a trailing
    /// newline.
    pub fn to_canonical_json(&self) -> Result<Vec<u8>> {
        // Round-trip through Value: serde_json maps are ordered, which yields
        // the sorted key order the on-disk format promises.
        let value = serde_json::to_value(self)?;
        let mut bytes = serde_json::to_vec_pretty(&value)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}
