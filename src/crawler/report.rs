//! Run counters and the end-of-run summary.

use std::sync::atomic::{AtomicU64, Ordering};

use colored::Colorize;

use crate::tracker::StatusTag;

/// Per-run totals, updated via atomic increments from the engine and worker
/// callbacks.
#[derive(Debug, Default)]
pub struct RunCounters {
    directories: AtomicU64,
    singles: AtomicU64,
    sequences: AtomicU64,
    sidecars_written: AtomicU64,
    marked_missing: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    skipped_assets: AtomicU64,
    frame_errors: AtomicU64,
    tracker_ok: AtomicU64,
    tracker_unauthorized: AtomicU64,
    tracker_not_found: AtomicU64,
    tracker_error: AtomicU64,
}

impl RunCounters {
    pub fn add_directory(&self) {
        self.directories.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_single(&self) {
        self.singles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_sequence(&self) {
        self.sequences.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_sidecar_written(&self) {
        self.sidecars_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_marked_missing(&self) {
        self.marked_missing.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_cache_hits(&self, n: u64) {
        self.cache_hits.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_cache_misses(&self, n: u64) {
        self.cache_misses.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_skipped_asset(&self) {
        self.skipped_assets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_frame_error(&self) {
        self.frame_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_tracker(&self, tag: StatusTag) {
        let slot = match tag {
            StatusTag::Ok => &self.tracker_ok,
            StatusTag::Unauthorized => &self.tracker_unauthorized,
            StatusTag::NotFound => &self.tracker_not_found,
            StatusTag::Error => &self.tracker_error,
        };
        slot.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> RunSummary {
        RunSummary {
            directories: self.directories.load(Ordering::Relaxed),
            singles: self.singles.load(Ordering::Relaxed),
            sequences: self.sequences.load(Ordering::Relaxed),
            sidecars_written: self.sidecars_written.load(Ordering::Relaxed),
            marked_missing: self.marked_missing.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            skipped_assets: self.skipped_assets.load(Ordering::Relaxed),
            frame_errors: self.frame_errors.load(Ordering::Relaxed),
            tracker_ok: self.tracker_ok.load(Ordering::Relaxed),
            tracker_unauthorized: self.tracker_unauthorized.load(Ordering::Relaxed),
            tracker_not_found: self.tracker_not_found.load(Ordering::Relaxed),
            tracker_error: self.tracker_error.load(Ordering::Relaxed),
        }
    }
}

/// Immutable totals for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub directories: u64,
    pub singles: u64,
    pub sequences: u64,
    pub sidecars_written: u64,
    pub marked_missing: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub skipped_assets: u64,
    pub frame_errors: u64,
    pub tracker_ok: u64,
    pub tracker_unauthorized: u64,
    pub tracker_not_found: u64,
    pub tracker_error: u64,
}

impl RunSummary {
    #[must_use]
    pub fn tracker_total(&self) -> u64 {
        self.tracker_ok + self.tracker_unauthorized + self.tracker_not_found + self.tracker_error
    }

    /// Human-readable summary block for stdout.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("{}\n", "QC crawl summary".bold()));
        out.push_str(&format!("  Directories scanned: {}\n", self.directories));
        out.push_str(&format!("  Singles processed:   {}\n", self.singles));
        out.push_str(&format!("  Sequences processed: {}\n", self.sequences));
        out.push_str(&format!("  Sidecars written:    {}\n", self.sidecars_written));
        out.push_str(&format!(
            "  Marked missing: {}\n",
            if self.marked_missing > 0 {
                self.marked_missing.to_string().yellow().to_string()
            } else {
                self.marked_missing.to_string()
            }
        ));
        out.push_str(&format!(
            "  Hash cache:          {} hits / {} misses\n",
            self.cache_hits, self.cache_misses
        ));
        if self.skipped_assets > 0 || self.frame_errors > 0 {
            out.push_str(&format!(
                "  Soft failures:       {} assets skipped, {} unreadable frames\n",
                self.skipped_assets.to_string().red(),
                self.frame_errors.to_string().red()
            ));
        }
        if self.tracker_total() > 0 {
            out.push_str(&format!(
                "  Tracker:             ok={} unauthorized={} not_found={} error={}\n",
                self.tracker_ok,
                self.tracker_unauthorized,
                self.tracker_not_found,
                self.tracker_error
            ));
        }
        out
    }
}
