//! Snapshot schema migration.
//!
//! Files written before snapshots were versioned hold the bare store payload.
//! They are treated as version `0.0.0` and wrapped into a current envelope.
//! Migrations run in sequence, so later schema versions only need to register
//! one step each.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::{json, Value};

use super::envelope::{checksum, CURRENT_SCHEMA_VERSION};
use crate::error::{ForgeError, Result};

/// Version assigned to files without a `schemaVersion` field.
pub const LEGACY_SCHEMA_VERSION: &str = "0.0.0";

type MigrationFn = fn(Value) -> Result<Value>;

fn migration_registry() -> HashMap<(&'static str, &'static str), MigrationFn> {
    let mut registry: HashMap<(&'static str, &'static str), MigrationFn> = HashMap::new();
    registry.insert((LEGACY_SCHEMA_VERSION, "1.0.0"), migrate_legacy_to_1_0_0);
    registry
}

/// Known schema versions, oldest first.
fn version_order() -> Vec<&'static str> {
    vec![LEGACY_SCHEMA_VERSION, "1.0.0"]
}

/// Version of a raw snapshot file.
pub fn schema_version(raw: &Value) -> &str {
    raw.get("schemaVersion")
        .and_then(Value::as_str)
        .unwrap_or(LEGACY_SCHEMA_VERSION)
}

/// Bring a raw snapshot file up to the current schema.
///
/// Returns the migrated value and whether anything changed.
pub fn migrate_snapshot(mut raw: Value) -> Result<(Value, bool)> {
    let current = schema_version(&raw).to_string();
    if current == CURRENT_SCHEMA_VERSION {
        return Ok((raw, false));
    }

    let versions = version_order();
    let Some(from_idx) = versions.iter().position(|v| *v == current) else {
        return Err(ForgeError::InvalidSchemaVersion { version: current });
    };
    let to_idx = versions
        .iter()
        .position(|v| *v == CURRENT_SCHEMA_VERSION)
        .unwrap_or(versions.len() - 1);
    if from_idx > to_idx {
        return Err(ForgeError::MigrationError {
            from: current,
            to: CURRENT_SCHEMA_VERSION.to_string(),
            reason: "Cannot downgrade snapshot from newer schema version".to_string(),
        });
    }

    let registry = migration_registry();
    for step in versions[from_idx..=to_idx].windows(2) {
        let (from, to) = (step[0], step[1]);
        let migration = registry.get(&(from, to)).ok_or_else(|| ForgeError::MigrationError {
            from: from.to_string(),
            to: to.to_string(),
            reason: "No migration registered".to_string(),
        })?;

        raw = migration(raw).map_err(|e| ForgeError::MigrationError {
            from: from.to_string(),
            to: to.to_string(),
            reason: e.to_string(),
        })?;
        if let Some(obj) = raw.as_object_mut() {
            obj.insert("schemaVersion".to_string(), Value::String(to.to_string()));
        }
    }

    Ok((raw, true))
}

/// Wrap a bare payload in an envelope.
fn migrate_legacy_to_1_0_0(data: Value) -> Result<Value> {
    Ok(json!({
        "schemaVersion": "1.0.0",
        "savedAt": Utc::now(),
        "checksum": checksum(&data)?,
        "data": data,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::envelope::SnapshotEnvelope;

    #[test]
    fn test_current_version_unchanged() {
        let raw = serde_json::to_value(SnapshotEnvelope::new(json!({"a": 1})).unwrap()).unwrap();
        let (migrated, changed) = migrate_snapshot(raw.clone()).unwrap();
        assert!(!changed);
        assert_eq!(migrated, raw);
    }

    #[test]
    fn test_legacy_payload_is_wrapped() {
        let legacy = json!({"sets": {"set1": {}}, "activeSetId": "set1"});
        let (migrated, changed) = migrate_snapshot(legacy.clone()).unwrap();
        assert!(changed);

        let envelope: SnapshotEnvelope = serde_json::from_value(migrated).unwrap();
        assert_eq!(envelope.schema_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(envelope.data, legacy);
        assert!(envelope.verify().unwrap());
    }

    #[test]
    fn test_unknown_version_rejected() {
        let raw = json!({"schemaVersion": "9.0.0", "data": {}});
        match migrate_snapshot(raw) {
            Err(ForgeError::InvalidSchemaVersion { version }) => assert_eq!(version, "9.0.0"),
            other => panic!("expected InvalidSchemaVersion, got {:?}", other),
        }
    }
}
