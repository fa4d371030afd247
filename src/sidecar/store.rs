//! Sidecar naming, reading (with migration), and atomic writes.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::warn;

use crate::core::atomicfile::write_atomic;
use crate::core::config::{RunConfig, SidecarMode};
use crate::core::errors::Result;
use crate::sidecar::migrate;
use crate::sidecar::schema::Sidecar;

/// Naming and layout rules for one run.
#[derive(Debug, Clone)]
pub struct SidecarStore {
    mode: SidecarMode,
    /// Suffix appended to single-file names, e.g. `.qc.json`.
    suffix: String,
    /// Sequence sidecar filename, e.g. `qc.sequence.json`.
    sequence_name: String,
    /// Hash cache filename, excluded from sidecar enumeration.
    hashcache_name: String,
}

impl SidecarStore {
    #[must_use]
    pub fn from_config(cfg: &RunConfig) -> Self {
        Self {
            mode: cfg.sidecar_mode,
            suffix: cfg.side_suffix.clone(),
            sequence_name: cfg.sequence_sidecar_name.clone(),
            hashcache_name: cfg.hashcache_name.clone(),
        }
    }

    /// Sidecar path for a single media file.
    #[must_use]
    pub fn path_for_single(&self, file: &Path) -> PathBuf {
        let dir = file.parent().unwrap_or_else(|| Path::new(""));
        let name = format!(
            "{}{}",
            file.file_name().map_or_else(String::new, |n| n
                .to_string_lossy()
                .into_owned()),
            self.suffix
        );
        match self.mode {
            SidecarMode::Inline => dir.join(name),
            SidecarMode::Dot => dir.join(format!(".{name}")),
            SidecarMode::Subdir => dir.join(".qc").join(name),
        }
    }

    /// Sidecar path for the sequence living in `dir`.
    #[must_use]
    pub fn path_for_sequence(&self, dir: &Path) -> PathBuf {
        match self.mode {
            SidecarMode::Inline => dir.join(&self.sequence_name),
            SidecarMode::Dot => dir.join(format!(".{}", self.sequence_name)),
            SidecarMode::Subdir => dir.join(".qc").join(&self.sequence_name),
        }
    }

    /// Read and migrate a sidecar.
    ///
    /// Absent file -> `Ok(None)`. Malformed JSON or a post-migration shape
    /// mismatch -> logged and treated as absent (a fresh record will be
    /// minted). A schema version newer than this build -> error; the caller
    /// skips the asset and leaves the file untouched.
    pub fn read(&self, path: &Path) -> Result<Option<Sidecar>> {
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "unreadable sidecar, treating as absent");
                return Ok(None);
            }
        };

        let mut map: Map<String, Value> = match serde_json::from_slice(&raw) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                warn!(path = %path.display(), "sidecar is not a JSON object, treating as absent");
                return Ok(None);
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "malformed sidecar JSON, treating as absent");
                return Ok(None);
            }
        };

        migrate::migrate_to_current(&mut map, path)?;

        match serde_json::from_value::<Sidecar>(Value::Object(map)) {
            Ok(sidecar) => Ok(Some(sidecar)),
            Err(error) => {
                warn!(path = %path.display(), %error, "sidecar failed schema load, treating as absent");
                Ok(None)
            }
        }
    }

    /// Atomically write a sidecar in canonical form, creating `.qc/` on
    /// demand.
    pub fn write(&self, path: &Path, sidecar: &Sidecar) -> Result<()> {
        let bytes = sidecar.to_canonical_json()?;
        write_atomic(path, &bytes)
    }

    /// Enumerate existing sidecars for one media directory across all layout
    /// modes (inline, dot, and the `.qc/` subdir). Used by missing-asset
    /// reconciliation, which must see sidecars regardless of the mode that
    /// wrote them.
    #[must_use]
    pub fn enumerate_dir(&self, dir: &Path) -> Vec<PathBuf> {
        let mut found = Vec::new();
        self.collect_sidecars(dir, &mut found);
        self.collect_sidecars(&dir.join(".qc"), &mut found);
        found.sort();
        found
    }

    fn collect_sidecars(&self, dir: &Path, out: &mut Vec<PathBuf>) {
        let Ok(read) = fs::read_dir(dir) else {
            return;
        };
        for entry in read.flatten() {
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if self.is_sidecar_name(&name) {
                out.push(entry.path());
            }
        }
    }

    fn is_sidecar_name(&self, name: &str) -> bool {
        if name == self.hashcache_name {
            return false;
        }
        name.ends_with(self.suffix.as_str())
            || name == self.sequence_name
            || name
                .strip_prefix('.')
                .is_some_and(|n| n == self.sequence_name)
    }
}

/// Path-level check used by reconciliation: does any file in `dir` still
/// belong to the recorded sequence pattern `<base><sep><digits>.<ext>`?
pub fn sequence_frames_exist(dir: &Path, base: &str, ext: &str) -> bool {
    let Ok(read) = fs::read_dir(dir) else {
        return false;
    };
    for entry in read.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(parsed) = crate::sequence::detect::parse_frame_name(&name) else {
            continue;
        };
        if parsed.base == base && parsed.ext == ext {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{CliOverrides, RunConfig};
    use crate::sidecar::schema::{ContentState, QcResult};
    use tempfile::TempDir;

    fn store(mode: SidecarMode) -> SidecarStore {
        let mut cli = CliOverrides::default();
        cli.roots = vec![PathBuf::from("/san")];
        cli.sidecar_mode = Some(mode);
        let cfg = RunConfig::resolve_from(cli, |_| None).unwrap();
        SidecarStore::from_config(&cfg)
    }

    fn sample() -> Sidecar {
        Sidecar {
            qc_id: "0192d5a0-0000-7000-8000-000000000001".to_string(),
            qc_time: "2026-08-01T02:00:00+00:00".to_string(),
            qc_result: QcResult::Pending,
            operator: "system".to_string(),
            notes: String::new(),
            tool_version: "qc-crawl/1.1.0".to_string(),
            policy_version: "2025.11.0".to_string(),
            schema_name: migrate::SCHEMA_NAME.to_string(),
            schema_version: migrate::SCHEMA_VERSION.to_string(),
            asset_id: None,
            asset_path: "/san/jobs/clip.mxf".to_string(),
            content_hash: "blake3:aa".to_string(),
            prev_content_hash: None,
            content_state: ContentState::New,
            sequence: None,
            last_valid_qc_id: None,
            last_valid_qc_time: None,
            tracker_status: None,
        }
    }

    #[test]
    fn single_paths_per_mode() {
        let file = Path::new("/p/clip.mxf");
        assert_eq!(
            store(SidecarMode::Inline).path_for_single(file),
            Path::new("/p/clip.mxf.qc.json")
        );
        assert_eq!(
            store(SidecarMode::Dot).path_for_single(file),
            Path::new("/p/.clip.mxf.qc.json")
        );
        assert_eq!(
            store(SidecarMode::Subdir).path_for_single(file),
            Path::new("/p/.qc/clip.mxf.qc.json")
        );
    }

    #[test]
    fn sequence_paths_per_mode() {
        let dir = Path::new("/p");
        assert_eq!(
            store(SidecarMode::Inline).path_for_sequence(dir),
            Path::new("/p/qc.sequence.json")
        );
        assert_eq!(
            store(SidecarMode::Dot).path_for_sequence(dir),
            Path::new("/p/.qc.sequence.json")
        );
        assert_eq!(
            store(SidecarMode::Subdir).path_for_sequence(dir),
            Path::new("/p/.qc/qc.sequence.json")
        );
    }

    #[test]
    fn read_absent_is_none() {
        let tmp = TempDir::new().unwrap();
        let store = store(SidecarMode::Subdir);
        assert!(store.read(&tmp.path().join("missing.qc.json")).unwrap().is_none());
    }

    #[test]
    fn read_malformed_is_none() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.qc.json");
        fs::write(&path, b"{ not json").unwrap();
        let store = store(SidecarMode::Subdir);
        assert!(store.read(&path).unwrap().is_none());
    }

    #[test]
    fn write_then_read_roundtrips() {
        let tmp = TempDir::new().unwrap();
        let store = store(SidecarMode::Subdir);
        let path = store.path_for_single(&tmp.path().join("clip.mxf"));

        let sidecar = sample();
        store.write(&path, &sidecar).unwrap();
        assert!(path.exists());
        assert!(tmp.path().join(".qc").is_dir(), ".qc created on demand");

        let loaded = store.read(&path).unwrap().expect("sidecar present");
        assert_eq!(loaded, sidecar);
    }

    #[test]
    fn read_migrates_legacy_payload() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("legacy.qc.json");
        fs::write(
            &path,
            serde_json::json!({
                "qc_id": "old-id",
                "qc_time": "2024-01-01T00:00:00+00:00",
                "qc_result": "pass",
                "operator": "alice",
                "note": "looked fine",
                "tool_version": "qc-crawl/1.0.0",
                "policy_version": "2024.01.0",
                "asset_id": null,
                "asset_path": "/p/clip.mxf",
                "content_hash": "blake3:aa",
            })
            .to_string(),
        )
        .unwrap();

        let store = store(SidecarMode::Inline);
        let loaded = store.read(&path).unwrap().expect("migrated sidecar");
        assert_eq!(loaded.schema_version, migrate::SCHEMA_VERSION);
        assert_eq!(loaded.notes, "looked fine");
        assert_eq!(loaded.content_state, ContentState::Unchanged);
        assert!(loaded.sequence.is_none());
    }

    #[test]
    fn read_rejects_newer_schema() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("future.qc.json");
        fs::write(&path, br#"{"schema_version":"9.0.0","qc_id":"x"}"#).unwrap();

        let store = store(SidecarMode::Subdir);
        let err = store.read(&path).expect_err("expected schema rejection");
        assert_eq!(err.code(), "QCR-2003");
        // File untouched.
        assert!(fs::read_to_string(&path).unwrap().contains("9.0.0"));
    }

    #[test]
    fn enumerate_finds_all_layouts_and_skips_cache() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join(".qc")).unwrap();
        let names = [
            "clip.mxf.qc.json",
            ".clip2.mxf.qc.json",
            "qc.sequence.json",
            ".qc.sequence.json",
            ".qc.hashcache.json",
            "frame.0001.exr",
        ];
        for name in names {
            fs::write(tmp.path().join(name), b"{}").unwrap();
        }
        fs::write(tmp.path().join(".qc/deep.mxf.qc.json"), b"{}").unwrap();
        fs::write(tmp.path().join(".qc/qc.sequence.json"), b"{}").unwrap();
        fs::write(tmp.path().join(".qc/.qc.hashcache.json"), b"{}").unwrap();

        let store = store(SidecarMode::Subdir);
        let found = store.enumerate_dir(tmp.path());
        let names: Vec<String> = found
            .iter()
            .map(|p| p.strip_prefix(tmp.path()).unwrap().to_string_lossy().into_owned())
            .collect();

        assert!(names.contains(&"clip.mxf.qc.json".to_string()));
        assert!(names.contains(&".clip2.mxf.qc.json".to_string()));
        assert!(names.contains(&"qc.sequence.json".to_string()));
        assert!(names.contains(&".qc.sequence.json".to_string()));
        assert!(names.contains(&".qc/deep.mxf.qc.json".to_string()));
        assert!(names.contains(&".qc/qc.sequence.json".to_string()));
        assert!(!names.iter().any(|n| n.contains("hashcache")));
        assert!(!names.iter().any(|n| n.contains("frame.0001.exr")));
    }

    #[test]
    fn sequence_frames_exist_matches_recorded_pattern() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("shot.0001.exr"), b"x").unwrap();

        assert!(sequence_frames_exist(tmp.path(), "shot", "exr"));
        assert!(!sequence_frames_exist(tmp.path(), "other", "exr"));
        assert!(!sequence_frames_exist(tmp.path(), "shot", "dpx"));
        assert!(!sequence_frames_exist(&tmp.path().join("gone"), "shot", "exr"));
    }
}
