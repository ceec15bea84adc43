//! JSON file gateway
//!
//! One file per store in the project directory (`rarity_config.json`,
//! `layer_order.json`, ...), each wrapped in a [`SnapshotEnvelope`]. Writes go
//! to a uniquely named temporary file in the project directory that is
//! persisted over the old one, after the old one has been copied to the
//! backups directory. Concurrent saves of one store never share a temp file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::backups::{self, BACKUPS_DIR};
use super::envelope::SnapshotEnvelope;
use super::migration::migrate_snapshot;
use super::PersistenceGateway;
use crate::engine::StoreKind;
use crate::error::{ForgeError, Result};

const SNAPSHOT_EXTENSION: &str = "json";

/// Stores snapshots as JSON files under a project directory.
#[derive(Debug, Clone)]
pub struct JsonFileGateway {
    root: PathBuf,
    max_backups: usize,
}

impl JsonFileGateway {
    pub fn new(root: impl Into<PathBuf>, max_backups: usize) -> Self {
        Self {
            root: root.into(),
            max_backups,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store_path(&self, store: StoreKind) -> PathBuf {
        self.root
            .join(store.name())
            .with_extension(SNAPSHOT_EXTENSION)
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.root.join(BACKUPS_DIR)
    }

    fn ensure_root(&self) -> Result<()> {
        if !self.root.exists() {
            fs::create_dir_all(&self.root).map_err(|e| ForgeError::DirectoryCreateError {
                path: self.root.clone(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Read and validate one snapshot file.
    fn read_envelope(&self, path: &Path) -> Result<SnapshotEnvelope> {
        let content = fs::read_to_string(path).map_err(|e| ForgeError::FileReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let raw: Value = serde_json::from_str(&content)?;
        let (migrated, changed) = migrate_snapshot(raw)?;
        if changed {
            info!(path = %path.display(), "migrated snapshot to current schema");
        }

        let envelope: SnapshotEnvelope = serde_json::from_value(migrated)?;
        if !envelope.verify()? {
            return Err(ForgeError::ChecksumMismatch {
                path: path.to_path_buf(),
            });
        }
        Ok(envelope)
    }
}

impl PersistenceGateway for JsonFileGateway {
    fn load_raw(&self, store: StoreKind) -> Result<Option<Value>> {
        let path = self.store_path(store);
        if !path.exists() {
            return Ok(None);
        }
        let envelope = self.read_envelope(&path)?;
        debug!(store = store.name(), saved_at = %envelope.saved_at, "snapshot loaded");
        Ok(Some(envelope.data))
    }

    fn save_raw(&self, store: StoreKind, data: &Value) -> Result<()> {
        self.ensure_root()?;

        let path = self.store_path(store);
        if path.exists() {
            backups::backup_file(&path, &self.backups_dir(), store.name(), self.max_backups)?;
        }

        let envelope = SnapshotEnvelope::new(data.clone())?;
        let content = serde_json::to_string_pretty(&envelope)?;

        let write_error = |e: std::io::Error| ForgeError::FileWriteError {
            path: path.clone(),
            source: e,
        };
        let mut temp = NamedTempFile::new_in(&self.root).map_err(write_error)?;
        temp.write_all(content.as_bytes()).map_err(write_error)?;
        temp.flush().map_err(write_error)?;
        temp.as_file().sync_all().map_err(write_error)?;
        temp.persist(&path).map_err(|e| write_error(e.error))?;

        debug!(store = store.name(), path = %path.display(), "snapshot saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_loads_none() {
        let temp = tempdir().unwrap();
        let gateway = JsonFileGateway::new(temp.path(), 10);
        assert!(gateway.load_raw(StoreKind::Filters).unwrap().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let temp = tempdir().unwrap();
        let gateway = JsonFileGateway::new(temp.path().join("project"), 10);
        let data = json!({"pipelines": [{"id": "mono", "name": "Mono", "weight": 100.0}]});

        gateway.save_raw(StoreKind::Filters, &data).unwrap();
        assert!(gateway.store_path(StoreKind::Filters).exists());
        let leftovers = fs::read_dir(gateway.root())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .count();
        assert_eq!(leftovers, 1);
        assert_eq!(gateway.load_raw(StoreKind::Filters).unwrap(), Some(data));
    }

    #[test]
    fn test_overwrite_creates_rotated_backups() {
        let temp = tempdir().unwrap();
        let gateway = JsonFileGateway::new(temp.path(), 2);
        for i in 0..4 {
            gateway.save_raw(StoreKind::LayerOrder, &json!({ "n": i })).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(5));
        }

        let backups = backups::list_backups(&gateway.backups_dir(), "layer_order").unwrap();
        assert_eq!(backups.len(), 2);
        assert_eq!(
            gateway.load_raw(StoreKind::LayerOrder).unwrap(),
            Some(json!({ "n": 3 }))
        );
    }

    #[test]
    fn test_tampered_file_fails_checksum() {
        let temp = tempdir().unwrap();
        let gateway = JsonFileGateway::new(temp.path(), 10);
        gateway.save_raw(StoreKind::Filters, &json!({"pipelines": []})).unwrap();

        let path = gateway.store_path(StoreKind::Filters);
        let mut raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        raw["data"] = json!({"pipelines": [{"id": "x", "name": "X", "weight": 5.0}]});
        fs::write(&path, serde_json::to_string(&raw).unwrap()).unwrap();

        let err = gateway.load_raw(StoreKind::Filters).unwrap_err();
        assert_eq!(err.error_code(), "CHECKSUM_MISMATCH");
    }

    #[test]
    fn test_legacy_file_is_migrated() {
        let temp = tempdir().unwrap();
        let gateway = JsonFileGateway::new(temp.path(), 10);
        let legacy = json!({"pipelines": []});
        fs::write(
            gateway.store_path(StoreKind::Filters),
            serde_json::to_string(&legacy).unwrap(),
        )
        .unwrap();

        assert_eq!(gateway.load_raw(StoreKind::Filters).unwrap(), Some(legacy));
    }
}
