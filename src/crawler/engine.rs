//! The crawl engine: per-directory batching, worker-pool dispatch, sidecar
//! reconciliation, and the multi-root driver.
//!
//! Ordering guarantees, per directory D:
//! - sidecars for D are written only after every hash task of D completed;
//! - the hash cache for D is saved after all its hashes are known and before
//!   D's sidecars are written;
//! - a sequence manifest is computed only when every surviving frame hash is
//!   available, in ascending frame order.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossbeam_channel as channel;
use tracing::{debug, info, warn};

use crate::core::config::{RunConfig, TOOL_VERSION};
use crate::core::errors::{QcError, Result};
use crate::core::paths::as_portable_string;
use crate::crawler::interrupt::InterruptFlag;
use crate::crawler::pool::{HashJob, HashPool};
use crate::crawler::report::{RunCounters, RunSummary};
use crate::crawler::walk::{self, DirectoryBatch, MediaEntry};
use crate::hashing::{self, cache::HashCache};
use crate::sequence::detect::{self, SequenceGroup};
use crate::sequence::summary::{compact_spans, missing_frames, summarize};
use crate::sidecar::schema::{ContentState, QcResult, SequenceSummary, Sidecar};
use crate::sidecar::state::{self, CurrentContent, RunContext};
use crate::sidecar::store::{SidecarStore, sequence_frames_exist};
use crate::tracker::{LookupOutcome, Tracker};

pub struct CrawlEngine {
    cfg: RunConfig,
    store: SidecarStore,
    tracker: Option<Arc<dyn Tracker>>,
    interrupt: InterruptFlag,
    counters: RunCounters,
}

/// A sequence waiting on its hashes, with the prior sidecar already loaded.
struct PendingSequence {
    group: SequenceGroup,
    summary: SequenceSummary,
    prior: Option<Sidecar>,
    /// Prior manifest hash carried forward by the cheap-fingerprint skip.
    reused_hash: Option<String>,
}

impl CrawlEngine {
    #[must_use]
    pub fn new(
        cfg: RunConfig,
        tracker: Option<Arc<dyn Tracker>>,
        interrupt: InterruptFlag,
    ) -> Self {
        let store = SidecarStore::from_config(&cfg);
        Self {
            cfg,
            store,
            tracker,
            interrupt,
            counters: RunCounters::default(),
        }
    }

    /// Crawl every configured root. Returns the run totals, or
    /// [`QcError::Interrupted`] after a signal drain (results for completed
    /// directories stay persisted).
    pub fn run(&self) -> Result<RunSummary> {
        let pool = HashPool::new(self.cfg.workers, self.cfg.algo, self.interrupt.clone());
        let total = self.cfg.roots.len();

        for (index, root) in self.cfg.roots.iter().enumerate() {
            if self.interrupt.is_requested() {
                return Err(QcError::Interrupted);
            }
            let cli_asset_id = self.cfg.asset_id_for_root(index).map(str::to_string);
            info!(
                root = %root.display(),
                asset_id = cli_asset_id.as_deref().unwrap_or("<auto>"),
                "=== CRAWL {}/{total} ===",
                index + 1
            );
            if !root.is_dir() {
                warn!(root = %root.display(), "crawl root is not a directory, skipping");
                continue;
            }

            let completed = walk::walk_root(root, &self.cfg.media_exts, &mut |batch| {
                if self.interrupt.is_requested() {
                    return Ok(false);
                }
                self.process_directory(&pool, batch, cli_asset_id.as_deref())?;
                Ok(true)
            })?;

            if !completed {
                return Err(QcError::Interrupted);
            }
        }

        pool.shutdown();
        Ok(self.counters.snapshot())
    }

    /// Point-in-time totals (used when reporting an interrupted run).
    #[must_use]
    pub fn summary(&self) -> RunSummary {
        self.counters.snapshot()
    }

    fn process_directory(
        &self,
        pool: &HashPool,
        batch: DirectoryBatch,
        cli_asset_id: Option<&str>,
    ) -> Result<()> {
        self.counters.add_directory();
        let dir = batch.dir.clone();

        let grouping = detect::group_media(&batch.media, &self.cfg.seq_exts, self.cfg.min_seq);
        if !grouping.sequences.is_empty() || !grouping.singles.is_empty() {
            self.process_assets(pool, &dir, grouping, cli_asset_id)?;
        }

        self.reconcile_missing(&dir);
        Ok(())
    }

    #[allow(clippy::too_many_lines)]
    fn process_assets(
        &self,
        pool: &HashPool,
        dir: &Path,
        grouping: detect::Grouping,
        cli_asset_id: Option<&str>,
    ) -> Result<()> {
        let mut cache = HashCache::load(dir, &self.cfg.hashcache_name);

        let (reply_tx, reply_rx) = channel::unbounded();
        let mut submitted: usize = 0;
        // filename -> hash, filled from cache hits and worker replies.
        let mut hashes: BTreeMap<String, String> = BTreeMap::new();

        if grouping.sequences.len() > 1 {
            warn!(
                dir = %dir.display(),
                count = grouping.sequences.len(),
                "multiple sequences share one directory; they share one sequence sidecar"
            );
        }

        // ---------- sequences: cheap-fp skip or per-frame dispatch ----------
        let mut pending_sequences: Vec<PendingSequence> = Vec::new();
        for group in grouping.sequences {
            let sidecar_path = self.store.path_for_sequence(dir);
            let prior = match self.store.read(&sidecar_path) {
                Ok(prior) => prior,
                Err(error) => {
                    warn!(%error, "skipping sequence with unsupported sidecar schema");
                    self.counters.add_skipped_asset();
                    continue;
                }
            };

            let summary = summarize(&group);
            let frames_cached = group.frames.iter().all(|f| {
                cache
                    .lookup(&f.entry.file_name, f.entry.size, f.entry.mtime)
                    .is_some()
            });
            let fp_unchanged = prior
                .as_ref()
                .and_then(|p| p.sequence.as_ref())
                .is_some_and(|s| s.cheap_fp == summary.cheap_fp);

            let reused_hash = if fp_unchanged && frames_cached {
                // Certainly unchanged: no bytes are read for this sequence.
                self.counters.add_cache_hits(summary.frame_count);
                prior.as_ref().map(|p| p.content_hash.clone())
            } else {
                for frame in &group.frames {
                    let entry = &frame.entry;
                    if let Some(hash) =
                        cache.lookup(&entry.file_name, entry.size, entry.mtime)
                    {
                        self.counters.add_cache_hits(1);
                        hashes.insert(entry.file_name.clone(), hash.to_string());
                    } else {
                        self.counters.add_cache_misses(1);
                        submitted += 1;
                        pool.submit(HashJob {
                            file_name: entry.file_name.clone(),
                            path: entry.path.clone(),
                            reply: reply_tx.clone(),
                        })?;
                    }
                }
                None
            };

            pending_sequences.push(PendingSequence {
                group,
                summary,
                prior,
                reused_hash,
            });
        }

        // ---------- singles: cache consult or dispatch ----------
        for entry in &grouping.singles {
            if let Some(hash) = cache.lookup(&entry.file_name, entry.size, entry.mtime) {
                self.counters.add_cache_hits(1);
                hashes.insert(entry.file_name.clone(), hash.to_string());
            } else {
                self.counters.add_cache_misses(1);
                submitted += 1;
                pool.submit(HashJob {
                    file_name: entry.file_name.clone(),
                    path: entry.path.clone(),
                    reply: reply_tx.clone(),
                })?;
            }
        }
        drop(reply_tx);

        // ---------- directory barrier ----------
        let mut metadata: BTreeMap<&str, (u64, i64)> = BTreeMap::new();
        for seq in &pending_sequences {
            for frame in &seq.group.frames {
                metadata.insert(&frame.entry.file_name, (frame.entry.size, frame.entry.mtime));
            }
        }
        for entry in &grouping.singles {
            metadata.insert(&entry.file_name, (entry.size, entry.mtime));
        }

        let mut interrupted = false;
        for _ in 0..submitted {
            let reply = reply_rx.recv().map_err(|_| QcError::ChannelClosed {
                component: "hash_replies",
            })?;
            match reply.outcome {
                Ok(hash) => {
                    if let Some((size, mtime)) = metadata.get(reply.file_name.as_str()) {
                        cache.update(&reply.file_name, *size, *mtime, hash.clone());
                    }
                    hashes.insert(reply.file_name, hash);
                }
                Err(QcError::Interrupted) => interrupted = true,
                Err(error) => {
                    self.counters.add_frame_error();
                    warn!(
                        dir = %dir.display(),
                        file = reply.file_name,
                        %error,
                        "unreadable file excluded from this run"
                    );
                }
            }
        }
        drop(metadata);
        if interrupted {
            return Err(QcError::Interrupted);
        }

        // Cache is saved before any sidecar of this directory is written.
        if let Err(error) = cache.save(dir, &self.cfg.hashcache_name) {
            warn!(dir = %dir.display(), %error, "failed to save hash cache");
        }

        // ---------- finalize sequences ----------
        for pending in pending_sequences {
            self.finalize_sequence(dir, pending, &hashes, cli_asset_id);
        }

        // ---------- finalize singles ----------
        for entry in &grouping.singles {
            self.finalize_single(entry, &hashes, cli_asset_id);
        }

        Ok(())
    }

    fn finalize_sequence(
        &self,
        dir: &Path,
        pending: PendingSequence,
        hashes: &BTreeMap<String, String>,
        cli_asset_id: Option<&str>,
    ) {
        let PendingSequence {
            group,
            mut summary,
            prior,
            reused_hash,
        } = pending;

        let content_hash = if let Some(hash) = reused_hash {
            hash
        } else {
            // Frames whose hash failed drop out of the summary and manifest.
            let mut surviving = Vec::with_capacity(group.frames.len());
            let mut frame_hashes = Vec::with_capacity(group.frames.len());
            for frame in &group.frames {
                if let Some(hash) = hashes.get(&frame.entry.file_name) {
                    frame_hashes.push(hash.clone());
                    surviving.push(frame.clone());
                }
            }
            if surviving.is_empty() {
                warn!(
                    dir = %dir.display(),
                    pattern = group.pattern(),
                    "sequence has no readable frames, skipping this run"
                );
                self.counters.add_skipped_asset();
                return;
            }
            if surviving.len() != group.frames.len() {
                let reduced = SequenceGroup {
                    frames: surviving,
                    ..group.clone()
                };
                summary = summarize(&reduced);
            }
            hashing::manifest_hash(self.cfg.algo, &frame_hashes)
        };

        if summary.holes > 0 {
            debug!(
                dir = %dir.display(),
                pattern = group.pattern(),
                holes = summary.holes,
                missing = compact_spans(&missing_frames(&group), group.pad),
                "sequence has frame holes"
            );
        }

        let current = CurrentContent {
            asset_path: as_portable_string(dir),
            content_hash,
            sequence: Some(summary),
        };
        let sidecar_path = self.store.path_for_sequence(dir);
        if self.write_next(&sidecar_path, dir, prior, current, cli_asset_id) {
            self.counters.add_sequence();
        }
    }

    fn finalize_single(
        &self,
        entry: &MediaEntry,
        hashes: &BTreeMap<String, String>,
        cli_asset_id: Option<&str>,
    ) {
        let Some(content_hash) = hashes.get(&entry.file_name).cloned() else {
            // Hash failure was already logged and counted at the barrier.
            self.counters.add_skipped_asset();
            return;
        };

        let sidecar_path = self.store.path_for_single(&entry.path);
        let prior = match self.store.read(&sidecar_path) {
            Ok(prior) => prior,
            Err(error) => {
                warn!(%error, "skipping single with unsupported sidecar schema");
                self.counters.add_skipped_asset();
                return;
            }
        };

        let current = CurrentContent {
            asset_path: as_portable_string(&entry.path),
            content_hash,
            sequence: None,
        };
        if self.write_next(&sidecar_path, &entry.path, prior, current, cli_asset_id) {
            self.counters.add_single();
        }
    }

    /// Tracker interaction + state build + atomic write for one asset.
    /// Returns whether a sidecar was written.
    fn write_next(
        &self,
        sidecar_path: &Path,
        asset_fs_path: &Path,
        prior: Option<Sidecar>,
        current: CurrentContent,
        cli_asset_id: Option<&str>,
    ) -> bool {
        // Lookup at most once per asset per run, and only when the CLI did
        // not already pin an id.
        let lookup: Option<LookupOutcome> = match (&self.tracker, cli_asset_id) {
            (Some(tracker), None) => {
                let outcome = tracker.lookup(asset_fs_path);
                self.counters.add_tracker(outcome.status);
                Some(outcome)
            }
            _ => None,
        };

        let ctx = RunContext {
            operator: &self.cfg.operator,
            note: self.cfg.note.as_deref(),
            result_override: self.cfg.result_override,
            cli_asset_id,
            tool_version: TOOL_VERSION,
            policy_version: &self.cfg.policy_version,
            schema_name: &self.cfg.schema_name,
            schema_version: &self.cfg.schema_version,
        };
        let mut next = state::next_sidecar(prior.as_ref(), &current, &ctx, lookup.as_ref());

        // Post only finished verdicts for resolved assets; the posted record
        // is what lands on disk, with the post outcome as the most recent
        // tracker interaction.
        if let Some(tracker) = &self.tracker
            && next.qc_result != QcResult::Pending
            && let Some(asset_id) = next.asset_id.clone()
        {
            let outcome = tracker.post_result(&asset_id, &next);
            self.counters.add_tracker(outcome.status);
            next.tracker_status = Some(outcome.to_tracker_status());
        }

        match self.store.write(sidecar_path, &next) {
            Ok(()) => {
                self.counters.add_sidecar_written();
                debug!(
                    sidecar = %sidecar_path.display(),
                    state = %next.content_state,
                    result = %next.qc_result,
                    "sidecar written"
                );
                true
            }
            Err(error) => {
                warn!(sidecar = %sidecar_path.display(), %error, "sidecar write failed");
                self.counters.add_skipped_asset();
                false
            }
        }
    }

    /// Before leaving a directory: flip sidecars whose asset vanished to
    /// `content_state = "missing"`, preserving their content hash.
    fn reconcile_missing(&self, dir: &Path) {
        for sidecar_path in self.store.enumerate_dir(dir) {
            let sidecar = match self.store.read(&sidecar_path) {
                Ok(Some(sidecar)) => sidecar,
                Ok(None) => continue,
                // Newer-schema sidecars are opaque: left untouched.
                Err(error) => {
                    debug!(%error, "reconciliation leaving unsupported sidecar alone");
                    continue;
                }
            };
            if sidecar.content_state == ContentState::Missing {
                continue;
            }

            let asset_path = PathBuf::from(&sidecar.asset_path);
            let present = match &sidecar.sequence {
                Some(seq) => {
                    let seq_dir = if asset_path.is_dir() {
                        asset_path
                    } else {
                        dir.to_path_buf()
                    };
                    sequence_frames_exist(&seq_dir, &seq.base, &seq.ext)
                }
                None => asset_path.is_file(),
            };
            if present {
                continue;
            }

            let missing = state::mark_missing(&sidecar);
            match self.store.write(&sidecar_path, &missing) {
                Ok(()) => {
                    self.counters.add_marked_missing();
                    info!(
                        asset = sidecar.asset_path,
                        sidecar = %sidecar_path.display(),
                        "asset no longer on disk, marked missing"
                    );
                }
                Err(error) => {
                    warn!(sidecar = %sidecar_path.display(), %error, "failed to mark sidecar missing");
                }
            }
        }
    }
}
