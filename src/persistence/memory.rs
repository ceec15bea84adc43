//! In-memory gateway for tests and embedding.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use serde_json::Value;

use super::PersistenceGateway;
use crate::engine::StoreKind;
use crate::error::{ForgeError, Result};

/// Keeps the latest payload of each store in a map. Loads and saves can be
/// made to fail on demand.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    stores: Mutex<HashMap<StoreKind, Value>>,
    save_counts: Mutex<HashMap<StoreKind, usize>>,
    fail_saves: AtomicBool,
    fail_loads: AtomicBool,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a store.
    pub fn with_data(self, store: StoreKind, data: Value) -> Self {
        if let Ok(mut stores) = self.stores.lock() {
            stores.insert(store, data);
        }
        self
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    /// Latest payload saved for a store.
    pub fn stored(&self, store: StoreKind) -> Option<Value> {
        self.stores.lock().ok()?.get(&store).cloned()
    }

    /// Number of successful saves of a store.
    pub fn save_count(&self, store: StoreKind) -> usize {
        self.save_counts
            .lock()
            .map(|counts| counts.get(&store).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    fn poisoned() -> ForgeError {
        ForgeError::Backend {
            reason: "memory store lock poisoned".to_string(),
        }
    }
}

impl PersistenceGateway for MemoryGateway {
    fn load_raw(&self, store: StoreKind) -> Result<Option<Value>> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(ForgeError::Backend {
                reason: format!("load of {} failed", store.name()),
            });
        }
        let stores = self.stores.lock().map_err(|_| Self::poisoned())?;
        Ok(stores.get(&store).cloned())
    }

    fn save_raw(&self, store: StoreKind, data: &Value) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(ForgeError::Backend {
                reason: format!("save of {} failed", store.name()),
            });
        }
        self.stores
            .lock()
            .map_err(|_| Self::poisoned())?
            .insert(store, data.clone());
        *self
            .save_counts
            .lock()
            .map_err(|_| Self::poisoned())?
            .entry(store)
            .or_insert(0) += 1;
        Ok(())
    }
}
