//! Snapshot backups.
//!
//! Before a store file is overwritten, the previous version is copied to
//! `backups/<store>_<timestamp>_<suffix>.json`. The random suffix keeps two
//! backups taken in the same millisecond apart. Backups are rotated per store
//! so at most `max_backups` remain.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::error::{ForgeError, Result};

/// Directory holding backups, relative to the project directory.
pub const BACKUPS_DIR: &str = "backups";

const BACKUP_EXTENSION: &str = ".json";

fn backup_prefix(store_name: &str) -> String {
    format!("{}_", store_name)
}

/// Copy `source` into the backups directory and rotate old backups.
///
/// Returns the path of the new backup.
pub fn backup_file(
    source: &Path,
    backups_dir: &Path,
    store_name: &str,
    max_backups: usize,
) -> Result<PathBuf> {
    if !backups_dir.exists() {
        fs::create_dir_all(backups_dir).map_err(|e| ForgeError::DirectoryCreateError {
            path: backups_dir.to_path_buf(),
            source: e,
        })?;
    }

    // Format: <store>_YYYYMMDD_HHMMSS_mmm_<8 hex>.json
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S_%3f");
    let suffix = Uuid::new_v4().simple().to_string();
    let filename = format!(
        "{}{}_{}{}",
        backup_prefix(store_name),
        timestamp,
        &suffix[..8],
        BACKUP_EXTENSION
    );
    let backup_path = backups_dir.join(filename);

    fs::copy(source, &backup_path).map_err(|e| ForgeError::FileWriteError {
        path: backup_path.clone(),
        source: e,
    })?;

    rotate_backups(backups_dir, store_name, max_backups)?;
    Ok(backup_path)
}

/// Delete the oldest backups of a store beyond `max_backups`.
pub fn rotate_backups(backups_dir: &Path, store_name: &str, max_backups: usize) -> Result<()> {
    let mut backups = list_backups(backups_dir, store_name)?;

    while backups.len() > max_backups {
        // Newest first, so the oldest is last.
        if let Some(oldest) = backups.pop() {
            match fs::remove_file(&oldest) {
                Ok(()) => {}
                // Another save rotated it first.
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(ForgeError::FileWriteError {
                        path: oldest,
                        source: e,
                    })
                }
            }
        }
    }

    Ok(())
}

/// Backups of one store, newest first.
pub fn list_backups(backups_dir: &Path, store_name: &str) -> Result<Vec<PathBuf>> {
    if !backups_dir.exists() {
        return Ok(Vec::new());
    }

    let prefix = backup_prefix(store_name);
    let mut backups: Vec<PathBuf> = WalkDir::new(backups_dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy();
            name.starts_with(&prefix)
                && name.ends_with(BACKUP_EXTENSION)
                && name[prefix.len()..].starts_with(|c: char| c.is_ascii_digit())
        })
        .map(|entry| entry.path().to_path_buf())
        .collect();

    // The timestamp sorts lexically.
    backups.sort_by(|a, b| {
        let a_name = a.file_name().unwrap_or_default().to_string_lossy();
        let b_name = b.file_name().unwrap_or_default().to_string_lossy();
        b_name.cmp(&a_name)
    });

    Ok(backups)
}

/// Most recent backup of a store.
pub fn latest_backup(backups_dir: &Path, store_name: &str) -> Result<Option<PathBuf>> {
    Ok(list_backups(backups_dir, store_name)?.into_iter().next())
}
