//! On-disk snapshot envelope.
//!
//! ```json
//! { "schemaVersion": "1.0.0", "savedAt": "...", "checksum": "<sha256>", "data": { ... } }
//! ```
//!
//! The checksum is the SHA-256 of the compact JSON encoding of `data`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Current schema version of snapshot files.
pub const CURRENT_SCHEMA_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotEnvelope {
    pub schema_version: String,
    pub saved_at: DateTime<Utc>,
    pub checksum: String,
    pub data: Value,
}

impl SnapshotEnvelope {
    /// Wrap a payload at the current schema version.
    pub fn new(data: Value) -> Result<Self> {
        Ok(Self {
            schema_version: CURRENT_SCHEMA_VERSION.to_string(),
            saved_at: Utc::now(),
            checksum: checksum(&data)?,
            data,
        })
    }

    pub fn verify(&self) -> Result<bool> {
        Ok(checksum(&self.data)? == self.checksum)
    }
}

/// Hex SHA-256 of the compact encoding of `data`.
pub fn checksum(data: &Value) -> Result<String> {
    let compact = serde_json::to_vec(data)?;
    Ok(format!("{:x}", Sha256::digest(&compact)))
}
