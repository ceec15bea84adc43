//! Engine settings
//!
//! Debounce intervals, enumeration limits and history/backup retention.
//! Settings are read from `traitforge.json` in the project directory; every
//! field falls back to its default when missing.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::StoreKind;
use crate::error::{ForgeError, Result};

/// Settings file name inside a project directory.
pub const SETTINGS_FILE: &str = "traitforge.json";

const DEFAULT_COMBINATIONS_DEBOUNCE_MS: u64 = 100;
const DEFAULT_RARITY_SAVE_DEBOUNCE_MS: u64 = 500;
const DEFAULT_LAYER_ORDER_SAVE_DEBOUNCE_MS: u64 = 300;
const DEFAULT_CONSTRAINT_SAVE_DEBOUNCE_MS: u64 = 300;
const DEFAULT_FILTER_SAVE_DEBOUNCE_MS: u64 = 300;
const DEFAULT_ENUMERATION_LIMIT: u64 = 1_000_000;
const DEFAULT_HISTORY_LIMIT: usize = 50;
const DEFAULT_MAX_BACKUPS: usize = 10;
const DEFAULT_NFT_COUNT: u32 = 100;

/// Tunables for the engine, scheduler and persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Delay before a combinatorics recomputation runs.
    pub combinations_debounce_ms: u64,

    /// Delay before the rarity config is written.
    pub rarity_save_debounce_ms: u64,

    /// Delay before sets/order state is written.
    pub layer_order_save_debounce_ms: u64,

    /// Delay before either constraint registry is written.
    pub constraint_save_debounce_ms: u64,

    /// Delay before filter pipeline weights are written.
    pub filter_save_debounce_ms: u64,

    /// Largest raw search space counted exactly per constrained component.
    pub enumeration_limit: u64,

    /// Maximum number of undo levels kept in memory.
    pub history_limit: usize,

    /// Backups retained per store by the file gateway.
    pub max_backups: usize,

    /// Output count given to newly created sets.
    pub default_nft_count: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            combinations_debounce_ms: DEFAULT_COMBINATIONS_DEBOUNCE_MS,
            rarity_save_debounce_ms: DEFAULT_RARITY_SAVE_DEBOUNCE_MS,
            layer_order_save_debounce_ms: DEFAULT_LAYER_ORDER_SAVE_DEBOUNCE_MS,
            constraint_save_debounce_ms: DEFAULT_CONSTRAINT_SAVE_DEBOUNCE_MS,
            filter_save_debounce_ms: DEFAULT_FILTER_SAVE_DEBOUNCE_MS,
            enumeration_limit: DEFAULT_ENUMERATION_LIMIT,
            history_limit: DEFAULT_HISTORY_LIMIT,
            max_backups: DEFAULT_MAX_BACKUPS,
            default_nft_count: DEFAULT_NFT_COUNT,
        }
    }
}

impl EngineSettings {
    /// Load settings from a project directory, or defaults if the file is absent.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let path = project_dir.join(SETTINGS_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).map_err(|e| ForgeError::FileReadError {
            path: path.clone(),
            source: e,
        })?;
        let settings: EngineSettings = serde_json::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.enumeration_limit == 0 {
            return Err(ForgeError::InvalidSettings {
                reason: "enumeration_limit must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn combinations_debounce(&self) -> Duration {
        Duration::from_millis(self.combinations_debounce_ms)
    }

    /// Save debounce for one persisted store.
    pub fn save_debounce(&self, store: StoreKind) -> Duration {
        let ms = match store {
            StoreKind::RarityConfig => self.rarity_save_debounce_ms,
            StoreKind::LayerOrder => self.layer_order_save_debounce_ms,
            StoreKind::Incompatibilities | StoreKind::ForcedCombinations => {
                self.constraint_save_debounce_ms
            }
            StoreKind::Filters => self.filter_save_debounce_ms,
        };
        Duration::from_millis(ms)
    }
}
