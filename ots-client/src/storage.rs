//! Storage for detached timestamp files
//!
//! A proof for `file` lives next to it as `file.ots`. New proofs never
//! overwrite an existing one; rewritten proofs keep the previous version as
//! `file.ots.bak`.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use ots_core::DetachedTimestampFile;

use crate::{ClientError, Result};

pub const OTS_EXTENSION: &str = "ots";

/// `file` -> `file.ots`
pub fn ots_path(target: &Path) -> PathBuf {
    append_extension(target, OTS_EXTENSION)
}

/// `file.ots` -> `file`
pub fn target_path(ots: &Path) -> Option<PathBuf> {
    match ots.extension() {
        Some(ext) if ext == OTS_EXTENSION => Some(ots.with_extension("")),
        _ => None,
    }
}

pub fn backup_path(ots: &Path) -> PathBuf {
    append_extension(ots, "bak")
}

fn append_extension(path: &Path, ext: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

pub fn read_timestamp(path: &Path) -> Result<DetachedTimestampFile> {
    let bytes = std::fs::read(path)
        .map_err(|e| ClientError::Storage(format!("Failed to read {}: {}", path.display(), e)))?;
    Ok(DetachedTimestampFile::from_slice(&bytes)?)
}

/// Write a new proof, refusing to replace an existing file.
pub fn write_new(path: &Path, file: &DetachedTimestampFile) -> Result<()> {
    let bytes = file.to_bytes()?;
    let mut out = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| ClientError::Storage(format!("Failed to create {}: {}", path.display(), e)))?;
    out.write_all(&bytes)
        .and_then(|_| out.sync_all())
        .map_err(|e| ClientError::Storage(format!("Failed to write {}: {}", path.display(), e)))?;
    Ok(())
}

/// Replace the proof at `path`, moving the old one to its backup path.
///
/// Fails without touching anything if a backup already exists.
pub fn replace_with_backup(path: &Path, file: &DetachedTimestampFile) -> Result<PathBuf> {
    let bytes = file.to_bytes()?;
    let backup = backup_path(path);
    if backup.exists() {
        return Err(ClientError::Storage(format!(
            "Backup {} already exists",
            backup.display()
        )));
    }

    std::fs::rename(path, &backup).map_err(|e| {
        ClientError::Storage(format!("Failed to back up {}: {}", path.display(), e))
    })?;
    std::fs::write(path, bytes)
        .map_err(|e| ClientError::Storage(format!("Failed to write {}: {}", path.display(), e)))?;
    Ok(backup)
}
