//! Shared test infrastructure for the QC asset crawler.
//!
//! Provides:
//! - `TestEnvironment` — media tree builder with mtime control
//! - `make_sequence()` — synthetic frame-sequence generator
//! - `MockTracker` — configurable tracker double with call recording
//! - `run_crawl()` — one-shot engine run over a root

// Not every test binary uses every item; suppress dead-code warnings for the
// shared module.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use qc_asset_crawler::core::config::{CliOverrides, RunConfig, SidecarMode};
use qc_asset_crawler::crawler::engine::CrawlEngine;
use qc_asset_crawler::crawler::interrupt::InterruptFlag;
use qc_asset_crawler::crawler::report::RunSummary;
use qc_asset_crawler::sidecar::schema::{QcResult, Sidecar};
use qc_asset_crawler::tracker::{LookupOutcome, PostOutcome, StatusTag, Tracker};

// ──────────────────── TestEnvironment ────────────────────

/// Builder for media directory trees with controlled content and ages.
pub struct TestEnvironment {
    root: tempfile::TempDir,
}

impl TestEnvironment {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().expect("create test tempdir"),
        }
    }

    /// Raw (non-canonicalized) root path.
    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Canonicalized root, as the crawler records it in `asset_path`.
    pub fn canonical_root(&self) -> PathBuf {
        fs::canonicalize(self.root.path()).expect("canonicalize test root")
    }

    /// Create a file with the given content, mtime set `age` in the past.
    pub fn create_file(&self, rel_path: &str, content: &[u8], age: Duration) -> PathBuf {
        let path = self.root.path().join(rel_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(&path, content).expect("write test file");

        let mtime = SystemTime::now() - age;
        filetime::set_file_mtime(&path, filetime::FileTime::from_system_time(mtime))
            .expect("set mtime");
        path
    }

    pub fn create_dir(&self, rel_path: &str) -> PathBuf {
        let path = self.root.path().join(rel_path);
        fs::create_dir_all(&path).expect("create test dir");
        path
    }
}

// ──────────────────── synthetic sequences ────────────────────

/// Create frame files `<base>.<frame padded>.<ext>` for every frame in
/// `frames`, each holding `frame`-dependent bytes so content hashes differ
/// per frame.
pub fn make_sequence(dir: &Path, base: &str, pad: usize, ext: &str, frames: &[u64]) {
    fs::create_dir_all(dir).expect("create sequence dir");
    for &frame in frames {
        let name = format!("{base}.{frame:0pad$}.{ext}");
        let body = format!("frame-{frame}").into_bytes();
        fs::write(dir.join(name), body).expect("write frame");
    }
}

// ──────────────────── MockTracker ────────────────────

/// Configurable tracker double. Records every call so tests can assert the
/// once-per-asset lookup contract and post gating.
pub struct MockTracker {
    pub lookup_response: LookupOutcome,
    pub post_response: PostOutcome,
    pub lookups: Mutex<Vec<PathBuf>>,
    pub posts: Mutex<Vec<(String, QcResult)>>,
}

impl MockTracker {
    pub fn returning(lookup_response: LookupOutcome) -> Arc<Self> {
        Arc::new(Self {
            lookup_response,
            post_response: PostOutcome {
                status: StatusTag::Ok,
                http_code: Some(200),
            },
            lookups: Mutex::new(Vec::new()),
            posts: Mutex::new(Vec::new()),
        })
    }

    pub fn unauthorized() -> Arc<Self> {
        Self::returning(LookupOutcome {
            asset_id: None,
            status: StatusTag::Unauthorized,
            http_code: Some(401),
        })
    }

    pub fn matching(asset_id: &str) -> Arc<Self> {
        Self::returning(LookupOutcome {
            asset_id: Some(asset_id.to_string()),
            status: StatusTag::Ok,
            http_code: Some(200),
        })
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.lock().unwrap().len()
    }

    pub fn post_count(&self) -> usize {
        self.posts.lock().unwrap().len()
    }
}

impl Tracker for MockTracker {
    fn lookup(&self, asset_path: &Path) -> LookupOutcome {
        self.lookups.lock().unwrap().push(asset_path.to_path_buf());
        self.lookup_response.clone()
    }

    fn post_result(&self, asset_id: &str, sidecar: &Sidecar) -> PostOutcome {
        self.posts
            .lock()
            .unwrap()
            .push((asset_id.to_string(), sidecar.qc_result));
        self.post_response.clone()
    }
}

// ──────────────────── engine runner ────────────────────

/// Options for a one-shot crawl over a single root.
#[derive(Default, Clone)]
pub struct CrawlOptions {
    pub operator: Option<String>,
    pub result: Option<QcResult>,
    pub note: Option<String>,
    pub asset_ids: Vec<String>,
    pub min_seq: Option<usize>,
    pub sidecar_mode: Option<SidecarMode>,
}

pub fn config_for(root: &Path, opts: &CrawlOptions) -> RunConfig {
    let cli = CliOverrides {
        roots: vec![root.to_path_buf()],
        asset_ids: opts.asset_ids.clone(),
        workers: Some(2),
        min_seq: opts.min_seq,
        sidecar_mode: opts.sidecar_mode,
        result: opts.result,
        operator: opts.operator.clone().or_else(|| Some("testop".to_string())),
        note: opts.note.clone(),
        tracker_enabled: false,
        tracker_url: None,
        tracker_token: None,
    };
    // Empty env lookup keeps tests hermetic regardless of the host shell.
    RunConfig::resolve_from(cli, |_| None).expect("resolve test config")
}

/// Run one crawl over `root` and return the run summary.
pub fn run_crawl(root: &Path, opts: &CrawlOptions, tracker: Option<Arc<dyn Tracker>>) -> RunSummary {
    let cfg = config_for(root, opts);
    let engine = CrawlEngine::new(cfg, tracker, InterruptFlag::new());
    engine.run().expect("crawl run")
}

/// Nightly run with defaults.
pub fn nightly(root: &Path) -> RunSummary {
    run_crawl(root, &CrawlOptions::default(), None)
}

// ──────────────────── sidecar helpers ────────────────────

/// Parse a sidecar file as loose JSON for field-level assertions.
pub fn read_sidecar_json(path: &Path) -> serde_json::Value {
    let raw = fs::read(path)
        .unwrap_or_else(|e| panic!("read sidecar {}: {e}", path.display()));
    serde_json::from_slice(&raw)
        .unwrap_or_else(|e| panic!("parse sidecar {}: {e}", path.display()))
}

/// A sidecar JSON value with `qc_time` removed, for byte-stability checks.
pub fn without_qc_time(mut value: serde_json::Value) -> serde_json::Value {
    if let Some(map) = value.as_object_mut() {
        map.remove("qc_time");
    }
    value
}
