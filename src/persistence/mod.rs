//! Persistence gateway
//!
//! Each store is loaded and saved independently as a JSON value, and every
//! operation can fail on its own. The engine never talks to a gateway
//! directly; the session loads state once and the scheduler decides when to
//! save.

pub mod backups;
pub mod envelope;
pub mod json_store;
pub mod memory;
pub mod migration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::constraints::ConstraintRegistry;
use crate::engine::{EngineState, StoreKind};
use crate::error::{ForgeError, Result};
use crate::model::{FilterState, LayerOrderState, RarityConfig};

pub use json_store::JsonFileGateway;
pub use memory::MemoryGateway;

/// Load/save access to the five stores.
pub trait PersistenceGateway {
    /// Payload of a store, or `None` if it was never saved.
    fn load_raw(&self, store: StoreKind) -> Result<Option<Value>>;

    fn save_raw(&self, store: StoreKind, data: &Value) -> Result<()>;

    fn load_rarity_config(&self) -> Result<Option<RarityConfig>> {
        load_typed(self, StoreKind::RarityConfig)
    }

    fn save_rarity_config(&self, config: &RarityConfig) -> Result<()> {
        save_typed(self, StoreKind::RarityConfig, config)
    }

    fn load_layer_order_state(&self) -> Result<Option<LayerOrderState>> {
        load_typed(self, StoreKind::LayerOrder)
    }

    fn save_layer_order_state(&self, state: &LayerOrderState) -> Result<()> {
        save_typed(self, StoreKind::LayerOrder, state)
    }

    fn load_incompatibility_state(&self) -> Result<Option<ConstraintRegistry>> {
        load_typed(self, StoreKind::Incompatibilities)
    }

    fn save_incompatibility_state(&self, registry: &ConstraintRegistry) -> Result<()> {
        save_typed(self, StoreKind::Incompatibilities, registry)
    }

    fn load_forced_combination_state(&self) -> Result<Option<ConstraintRegistry>> {
        load_typed(self, StoreKind::ForcedCombinations)
    }

    fn save_forced_combination_state(&self, registry: &ConstraintRegistry) -> Result<()> {
        save_typed(self, StoreKind::ForcedCombinations, registry)
    }

    fn load_filter_state(&self) -> Result<Option<FilterState>> {
        load_typed(self, StoreKind::Filters)
    }

    fn save_filter_state(&self, filters: &FilterState) -> Result<()> {
        save_typed(self, StoreKind::Filters, filters)
    }
}

impl<G: PersistenceGateway + ?Sized> PersistenceGateway for std::sync::Arc<G> {
    fn load_raw(&self, store: StoreKind) -> Result<Option<Value>> {
        (**self).load_raw(store)
    }

    fn save_raw(&self, store: StoreKind, data: &Value) -> Result<()> {
        (**self).save_raw(store, data)
    }
}

fn load_typed<G, T>(gateway: &G, store: StoreKind) -> Result<Option<T>>
where
    G: PersistenceGateway + ?Sized,
    T: DeserializeOwned,
{
    match gateway.load_raw(store)? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

fn save_typed<G, T>(gateway: &G, store: StoreKind, data: &T) -> Result<()>
where
    G: PersistenceGateway + ?Sized,
    T: Serialize,
{
    gateway.save_raw(store, &serde_json::to_value(data)?)
}

/// Serialize the part of the engine state a store holds.
pub fn store_payload(state: &EngineState, store: StoreKind) -> Result<Value> {
    let value = match store {
        StoreKind::RarityConfig => serde_json::to_value(&state.rarity)?,
        StoreKind::LayerOrder => serde_json::to_value(&state.layout)?,
        StoreKind::Incompatibilities => serde_json::to_value(&state.incompatibilities)?,
        StoreKind::ForcedCombinations => serde_json::to_value(&state.forced_combinations)?,
        StoreKind::Filters => serde_json::to_value(&state.filters)?,
    };
    Ok(value)
}

/// Load every store. A store that is missing or fails to load is left at its
/// default; the failures are returned for the caller to report.
pub fn load_state<G>(gateway: &G) -> (EngineState, Vec<(StoreKind, ForgeError)>)
where
    G: PersistenceGateway + ?Sized,
{
    let mut state = EngineState::default();
    let mut failures = Vec::new();

    macro_rules! load_into {
        ($field:expr, $store:expr, $load:ident) => {
            match gateway.$load() {
                Ok(Some(value)) => $field = value,
                Ok(None) => {}
                Err(e) => failures.push(($store, e)),
            }
        };
    }

    load_into!(state.rarity, StoreKind::RarityConfig, load_rarity_config);
    load_into!(state.layout, StoreKind::LayerOrder, load_layer_order_state);
    load_into!(
        state.incompatibilities,
        StoreKind::Incompatibilities,
        load_incompatibility_state
    );
    load_into!(
        state.forced_combinations,
        StoreKind::ForcedCombinations,
        load_forced_combination_state
    );
    load_into!(state.filters, StoreKind::Filters, load_filter_state);

    (state, failures)
}
