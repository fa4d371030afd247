//! QC state builder: prior sidecar + current content + run inputs -> next
//! sidecar payload.
//!
//! Pure decision logic; all IO stays in the engine. The rules:
//!
//! - `content_state` follows the four-way table (new / unchanged / modified /
//!   missing).
//! - `qc_id` changes only when an operator verdict (`pass`/`fail`) is being
//!   recorded; nightly runs preserve it.
//! - `asset_id` is sticky: CLI value, then a successful tracker lookup, then
//!   the prior sidecar. Tracker failures never clear an existing id.

use chrono::{SecondsFormat, Utc};
use uuid::Uuid;

use crate::sidecar::schema::{ContentState, QcResult, SequenceSummary, Sidecar, TrackerStatus};
use crate::tracker::LookupOutcome;

/// Run-constant identity and policy fields stamped into every sidecar.
#[derive(Debug, Clone, Copy)]
pub struct RunContext<'a> {
    pub operator: &'a str,
    pub note: Option<&'a str>,
    /// `Some(pass|fail)` marks an operator sign-off; `Some(pending)` and
    /// `None` are nightly semantics.
    pub result_override: Option<QcResult>,
    pub cli_asset_id: Option<&'a str>,
    pub tool_version: &'a str,
    pub policy_version: &'a str,
    pub schema_name: &'a str,
    pub schema_version: &'a str,
}

impl RunContext<'_> {
    /// Whether this run records an operator verdict and mints a fresh qc_id.
    #[must_use]
    pub fn mints_verdict(&self) -> bool {
        matches!(
            self.result_override,
            Some(QcResult::Pass) | Some(QcResult::Fail)
        )
    }
}

/// What the crawl found on disk for one asset.
#[derive(Debug, Clone)]
pub struct CurrentContent {
    /// Absolute path: the file for singles, the directory for sequences.
    pub asset_path: String,
    pub content_hash: String,
    pub sequence: Option<SequenceSummary>,
}

/// Current UTC wall time in the RFC3339 form sidecars carry.
#[must_use]
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Mint a time-ordered QC event id (UUIDv7: 48-bit unix-ms timestamp +
/// version + random).
#[must_use]
pub fn new_qc_id() -> String {
    Uuid::now_v7().to_string()
}

/// Build the next sidecar payload for an asset that exists on disk.
#[must_use]
pub fn next_sidecar(
    prior: Option<&Sidecar>,
    current: &CurrentContent,
    ctx: &RunContext<'_>,
    tracker: Option<&LookupOutcome>,
) -> Sidecar {
    let minted = ctx.mints_verdict();
    let qc_time = now_rfc3339();

    let qc_id = if minted {
        new_qc_id()
    } else {
        prior.map_or_else(new_qc_id, |p| p.qc_id.clone())
    };

    let qc_result = ctx.result_override.unwrap_or(QcResult::Pending);

    let (content_state, prev_content_hash) = match prior {
        None => (ContentState::New, None),
        Some(p) if p.content_hash == current.content_hash => {
            (ContentState::Unchanged, p.prev_content_hash.clone())
        }
        Some(p) => (ContentState::Modified, Some(p.content_hash.clone())),
    };

    let asset_id = resolve_asset_id(prior, ctx, tracker);

    let (last_valid_qc_id, last_valid_qc_time) = if minted {
        (Some(qc_id.clone()), Some(qc_time.clone()))
    } else {
        (
            prior.and_then(|p| p.last_valid_qc_id.clone()),
            prior.and_then(|p| p.last_valid_qc_time.clone()),
        )
    };

    let tracker_status: Option<TrackerStatus> = tracker
        .map(LookupOutcome::to_tracker_status)
        .or_else(|| prior.and_then(|p| p.tracker_status.clone()));

    Sidecar {
        qc_id,
        qc_time,
        qc_result,
        operator: ctx.operator.to_string(),
        notes: ctx.note.unwrap_or_default().to_string(),
        tool_version: ctx.tool_version.to_string(),
        policy_version: ctx.policy_version.to_string(),
        schema_name: ctx.schema_name.to_string(),
        schema_version: ctx.schema_version.to_string(),
        asset_id,
        asset_path: current.asset_path.clone(),
        content_hash: current.content_hash.clone(),
        prev_content_hash,
        content_state,
        sequence: current.sequence.clone(),
        last_valid_qc_id,
        last_valid_qc_time,
        tracker_status,
    }
}

/// Transition a sidecar whose asset vanished from disk.
///
/// Keeps the last known `content_hash` (carried forward), the qc verdict,
/// and all history fields; only `content_state` and `qc_time` move.
#[must_use]
pub fn mark_missing(prior: &Sidecar) -> Sidecar {
    let mut next = prior.clone();
    next.content_state = ContentState::Missing;
    next.qc_time = now_rfc3339();
    next
}

/// Sticky asset id resolution. First defined wins: CLI value, tracker lookup
/// that actually returned an asset, prior sidecar.
fn resolve_asset_id(
    prior: Option<&Sidecar>,
    ctx: &RunContext<'_>,
    tracker: Option<&LookupOutcome>,
) -> Option<String> {
    if let Some(id) = ctx.cli_asset_id {
        return Some(id.to_string());
    }
    if let Some(id) = tracker.and_then(|t| t.asset_id.clone()) {
        return Some(id);
    }
    prior.and_then(|p| p.asset_id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::CheapFingerprint;
    use crate::tracker::StatusTag;

    fn ctx(result: Option<QcResult>) -> RunContext<'static> {
        RunContext {
            operator: "alice",
            note: None,
            result_override: result,
            cli_asset_id: None,
            tool_version: "qc-crawl/1.1.0",
            policy_version: "2025.11.0",
            schema_name: "qc.sidecar",
            schema_version: "1.1.0",
        }
    }

    fn current() -> CurrentContent {
        CurrentContent {
            asset_path: "/san/jobs/clip.mxf".to_string(),
            content_hash: "blake3:aa".to_string(),
            sequence: None,
        }
    }

    fn nightly(prior: Option<&Sidecar>) -> Sidecar {
        next_sidecar(prior, &current(), &ctx(None), None)
    }

    #[test]
    fn first_sight_is_new_with_pending_result() {
        let sidecar = nightly(None);
        assert_eq!(sidecar.content_state, ContentState::New);
        assert_eq!(sidecar.qc_result, QcResult::Pending);
        assert!(sidecar.prev_content_hash.is_none());
        assert!(sidecar.last_valid_qc_id.is_none());
        assert!(sidecar.sequence.is_none());
        assert!(!sidecar.qc_id.is_empty());
    }

    #[test]
    fn unchanged_content_preserves_qc_id() {
        let first = nightly(None);
        let second = nightly(Some(&first));
        assert_eq!(second.qc_id, first.qc_id);
        assert_eq!(second.content_state, ContentState::Unchanged);
        assert!(second.prev_content_hash.is_none());
    }

    #[test]
    fn modified_content_records_prev_hash_and_keeps_qc_id() {
        let first = nightly(None);
        let changed = CurrentContent {
            content_hash: "blake3:bb".to_string(),
            ..current()
        };
        let second = next_sidecar(Some(&first), &changed, &ctx(None), None);
        assert_eq!(second.content_state, ContentState::Modified);
        assert_eq!(second.prev_content_hash.as_deref(), Some("blake3:aa"));
        assert_eq!(second.qc_id, first.qc_id, "nightly run keeps qc_id");
        assert_eq!(second.qc_result, QcResult::Pending);
    }

    #[test]
    fn unchanged_carries_prior_prev_hash_forward() {
        let mut first = nightly(None);
        first.prev_content_hash = Some("blake3:ancient".to_string());
        let second = nightly(Some(&first));
        assert_eq!(
            second.prev_content_hash.as_deref(),
            Some("blake3:ancient"),
            "unchanged runs keep the existing prev_content_hash"
        );
    }

    #[test]
    fn operator_verdict_mints_fresh_qc_id() {
        let first = nightly(None);
        let second = next_sidecar(Some(&first), &current(), &ctx(Some(QcResult::Pass)), None);
        assert_ne!(second.qc_id, first.qc_id);
        assert_eq!(second.qc_result, QcResult::Pass);
        assert_eq!(second.last_valid_qc_id.as_deref(), Some(second.qc_id.as_str()));
        assert_eq!(
            second.last_valid_qc_time.as_deref(),
            Some(second.qc_time.as_str())
        );
    }

    #[test]
    fn pending_override_behaves_as_nightly() {
        let first = nightly(None);
        let second = next_sidecar(
            Some(&first),
            &current(),
            &ctx(Some(QcResult::Pending)),
            None,
        );
        assert_eq!(second.qc_id, first.qc_id);
        assert!(second.last_valid_qc_id.is_none());
    }

    #[test]
    fn nightly_preserves_last_valid_fields() {
        let mut approved = nightly(None);
        approved.qc_result = QcResult::Pass;
        approved.last_valid_qc_id = Some(approved.qc_id.clone());
        approved.last_valid_qc_time = Some(approved.qc_time.clone());

        let next = nightly(Some(&approved));
        assert_eq!(next.qc_result, QcResult::Pending, "nightly resets to pending");
        assert_eq!(next.last_valid_qc_id, approved.last_valid_qc_id);
        assert_eq!(next.last_valid_qc_time, approved.last_valid_qc_time);
    }

    #[test]
    fn cli_asset_id_wins_over_everything() {
        let mut prior = nightly(None);
        prior.asset_id = Some("PRIOR".to_string());
        let lookup = LookupOutcome {
            asset_id: Some("TRACKED".to_string()),
            status: StatusTag::Ok,
            http_code: Some(200),
        };
        let mut context = ctx(None);
        context.cli_asset_id = Some("CLI");

        let next = next_sidecar(Some(&prior), &current(), &context, Some(&lookup));
        assert_eq!(next.asset_id.as_deref(), Some("CLI"));
    }

    #[test]
    fn tracker_match_wins_over_prior() {
        let mut prior = nightly(None);
        prior.asset_id = Some("PRIOR".to_string());
        let lookup = LookupOutcome {
            asset_id: Some("TRACKED".to_string()),
            status: StatusTag::Ok,
            http_code: Some(200),
        };
        let next = next_sidecar(Some(&prior), &current(), &ctx(None), Some(&lookup));
        assert_eq!(next.asset_id.as_deref(), Some("TRACKED"));
    }

    #[test]
    fn tracker_failure_never_clears_asset_id() {
        let mut prior = nightly(None);
        prior.asset_id = Some("A1".to_string());

        for (status, code) in [
            (StatusTag::Unauthorized, Some(401)),
            (StatusTag::NotFound, Some(404)),
            (StatusTag::Error, None),
        ] {
            let lookup = LookupOutcome {
                asset_id: None,
                status,
                http_code: code,
            };
            let next = next_sidecar(Some(&prior), &current(), &ctx(None), Some(&lookup));
            assert_eq!(next.asset_id.as_deref(), Some("A1"), "{status}");
            let recorded = next.tracker_status.expect("interaction recorded");
            assert_eq!(recorded.status, status.as_str());
            assert_eq!(recorded.http_code, code);
        }
    }

    #[test]
    fn tracker_status_carries_forward_without_interaction() {
        let mut prior = nightly(None);
        prior.tracker_status = Some(TrackerStatus {
            http_code: Some(401),
            status: "unauthorized".to_string(),
        });
        let next = nightly(Some(&prior));
        assert_eq!(next.tracker_status, prior.tracker_status);
    }

    #[test]
    fn note_is_recorded_fresh_each_run() {
        let mut context = ctx(Some(QcResult::Pass));
        context.note = Some("ok");
        let first = next_sidecar(None, &current(), &context, None);
        assert_eq!(first.notes, "ok");

        let second = nightly(Some(&first));
        assert_eq!(second.notes, "", "nightly run without note clears it");
    }

    #[test]
    fn mark_missing_preserves_hash_and_verdict() {
        let mut prior = nightly(None);
        prior.qc_result = QcResult::Pass;
        prior.last_valid_qc_id = Some(prior.qc_id.clone());
        prior.last_valid_qc_time = Some(prior.qc_time.clone());
        prior.qc_time = "2026-01-01T00:00:00+00:00".to_string();

        let missing = mark_missing(&prior);
        assert_eq!(missing.content_state, ContentState::Missing);
        assert_eq!(missing.content_hash, prior.content_hash);
        assert_eq!(missing.qc_id, prior.qc_id);
        assert_eq!(missing.qc_result, QcResult::Pass);
        assert_eq!(missing.last_valid_qc_id, prior.last_valid_qc_id);
        assert_ne!(missing.qc_time, prior.qc_time);
        assert_eq!(missing.prev_content_hash, prior.prev_content_hash);
    }

    #[test]
    fn sequence_summary_is_embedded() {
        let summary = SequenceSummary {
            base: "shot".to_string(),
            ext: "exr".to_string(),
            pad: 4,
            first: "shot.0001.exr".to_string(),
            last: "shot.0010.exr".to_string(),
            frame_min: 1,
            frame_max: 10,
            frame_count: 8,
            range_count: 3,
            holes: 2,
            cheap_fp: CheapFingerprint {
                files: 8,
                bytes: 800,
                newest_mtime: 99,
            },
        };
        let content = CurrentContent {
            asset_path: "/san/jobs/seq".to_string(),
            content_hash: "blake3:manifest".to_string(),
            sequence: Some(summary.clone()),
        };
        let sidecar = next_sidecar(None, &content, &ctx(None), None);
        assert_eq!(sidecar.sequence.as_ref(), Some(&summary));
        assert_eq!(sidecar.asset_path, "/san/jobs/seq");
    }

    #[test]
    fn qc_ids_are_time_ordered_uuids() {
        let a = new_qc_id();
        let b = new_qc_id();
        assert_ne!(a, b);
        let parsed = Uuid::parse_str(&a).unwrap();
        assert_eq!(parsed.get_version_num(), 7);
    }

    #[test]
    fn timestamps_are_rfc3339_utc() {
        let now = now_rfc3339();
        assert!(now.ends_with("+00:00"), "{now}");
        assert!(chrono::DateTime::parse_from_rfc3339(&now).is_ok());
    }
}
