//! Atomic file replacement: temp sibling -> fsync(temp) -> rename ->
//! fsync(dir). The one write primitive shared by sidecars and hash caches.

use std::fs::{self, OpenOptions};
use std::io::Write as IoWrite;
use std::path::Path;

use crate::core::errors::{QcError, Result};

/// Write `bytes` to `path` atomically.
///
/// The temp file is created as a sibling of the target so the rename never
/// crosses filesystems. On error the temp file is removed; the prior target
/// (if any) is left intact. The containing directory is fsynced after the
/// rename so the replacement is durable on POSIX.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().ok_or_else(|| QcError::InvalidConfig {
        details: format!("cannot atomically write to {}: no parent", path.display()),
    })?;
    fs::create_dir_all(parent).map_err(|e| QcError::io(parent, e))?;

    let tmp = tmp_sibling(path);
    let result = write_and_rename(&tmp, path, parent, bytes);
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn write_and_rename(tmp: &Path, path: &Path, parent: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = {
        let mut opts = OpenOptions::new();
        opts.write(true).create(true).truncate(true);
        opts.open(tmp).map_err(|e| QcError::io(tmp, e))?
    };
    file.write_all(bytes).map_err(|e| QcError::io(tmp, e))?;
    file.sync_all().map_err(|e| QcError::io(tmp, e))?;
    drop(file);

    // std::fs::rename maps to the OS replace primitive (POSIX rename,
    // MoveFileEx on Windows), not unlink+rename.
    fs::rename(tmp, path).map_err(|e| QcError::io(path, e))?;

    fsync_dir(parent);
    set_hidden_attribute(path);
    Ok(())
}

fn tmp_sibling(path: &Path) -> std::path::PathBuf {
    let mut name = path.file_name().map_or_else(
        || std::ffi::OsString::from("atomic"),
        std::ffi::OsStr::to_os_string,
    );
    name.push(".tmp");
    path.with_file_name(name)
}

/// Durability of the rename itself. Best-effort: some filesystems refuse
/// opening directories for sync.
fn fsync_dir(dir: &Path) {
    #[cfg(unix)]
    {
        if let Ok(handle) = fs::File::open(dir) {
            let _ = handle.sync_all();
        }
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
    }
}

/// Re-apply the hidden attribute after a replace. Dot-prefixed names are
/// already hidden on POSIX; Windows needs the attribute set explicitly.
/// Best-effort, mirrors the platform-tool approach of the original system.
fn set_hidden_attribute(path: &Path) {
    #[cfg(windows)]
    {
        let hidden_name = path
            .file_name()
            .map(|n| n.to_string_lossy().starts_with('.'))
            .unwrap_or(false);
        if hidden_name {
            let _ = std::process::Command::new("attrib")
                .arg("+h")
                .arg(path)
                .status();
        }
    }
    #[cfg(not(windows))]
    {
        let _ = path;
    }
}
