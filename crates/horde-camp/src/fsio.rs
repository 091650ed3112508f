//! Atomic file writes for encampment metadata.
//!
//! Every metadata write (routes, registries, redirect files, settings)
//! goes through write-to-temp-then-rename so a crashed repair never
//! leaves a half-written file behind.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Errors from atomic metadata writes.
#[derive(Debug, thiserror::Error)]
pub enum FsWriteError {
    #[error("{path}: {message}")]
    Io { path: String, message: String },
}

impl FsWriteError {
    fn io(path: &Path, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

/// Write `contents` to `path` atomically: temp file, fsync, rename.
///
/// Parent directories are created as needed.
pub fn write_atomic(path: impl AsRef<Path>, contents: &str) -> Result<(), FsWriteError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| FsWriteError::io(parent, &e))?;
    }

    let tmp_path = tmp_write_path(path);
    let write_result = (|| -> Result<(), FsWriteError> {
        let mut file = File::create(&tmp_path).map_err(|e| FsWriteError::io(&tmp_path, &e))?;
        file.write_all(contents.as_bytes())
            .map_err(|e| FsWriteError::io(&tmp_path, &e))?;
        file.sync_all().map_err(|e| FsWriteError::io(&tmp_path, &e))?;
        Ok(())
    })();

    if let Err(error) = write_result {
        let _ = fs::remove_file(&tmp_path);
        return Err(error);
    }

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        FsWriteError::io(path, &e)
    })?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all();
    }

    Ok(())
}

fn tmp_write_path(path: &Path) -> PathBuf {
    let unique = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let mut tmp: OsString = path.as_os_str().to_os_string();
    tmp.push(format!(".tmp.{}.{}", std::process::id(), unique));
    PathBuf::from(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_atomic_creates_parents_and_replaces() {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("horde-fsio-{}-{unique}", std::process::id()));
        let path = dir.join("nested/target.json");

        write_atomic(&path, "one\n").expect("first write should succeed");
        assert_eq!(fs::read_to_string(&path).unwrap(), "one\n");

        write_atomic(&path, "two\n").expect("replace should succeed");
        assert_eq!(fs::read_to_string(&path).unwrap(), "two\n");

        let _ = fs::remove_dir_all(&dir);
    }
}
