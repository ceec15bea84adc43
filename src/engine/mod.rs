//! Rarity engine
//!
//! [`Engine`] owns the whole configuration state and is its only writer.
//! Every mutating operation is a synchronous transition that returns the
//! effects it wants (saves, recomputation, notifications, preview requests)
//! instead of performing them.
//!
//! Operations that name a set, layer or trait that does not exist log a
//! warning and return an empty transition. Operations with malformed input
//! return a validation error and leave the state untouched.

mod constraints;
pub mod effects;
mod layers;
mod sets;
mod weights;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::warn;

use crate::combinatorics::{CombinationReport, CombinatoricsCalculator};
use crate::constraints::{ConstraintKind, ConstraintRegistry};
use crate::error::{ForgeError, Result};
use crate::model::{FilterState, LayerOrderState, RarityConfig, SetId, SetInfo};
use crate::settings::EngineSettings;

pub use effects::{Effect, Outcome, StoreKind, Transition};

/// Everything the engine persists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineState {
    pub rarity: RarityConfig,
    pub layout: LayerOrderState,
    pub incompatibilities: ConstraintRegistry,
    pub forced_combinations: ConstraintRegistry,
    pub filters: FilterState,
}

impl EngineState {
    pub fn registry(&self, kind: ConstraintKind) -> &ConstraintRegistry {
        match kind {
            ConstraintKind::Incompatibility => &self.incompatibilities,
            ConstraintKind::ForcedCombination => &self.forced_combinations,
        }
    }

    pub fn registry_mut(&mut self, kind: ConstraintKind) -> &mut ConstraintRegistry {
        match kind {
            ConstraintKind::Incompatibility => &mut self.incompatibilities,
            ConstraintKind::ForcedCombination => &mut self.forced_combinations,
        }
    }

    /// True if any store still holds an entry keyed by `set_id`.
    pub fn references_set(&self, set_id: &str) -> bool {
        self.rarity.references_set(set_id)
            || self.layout.references_set(set_id)
            || self.incompatibilities.references_set(set_id)
            || self.forced_combinations.references_set(set_id)
    }
}

/// The configuration service object.
pub struct Engine {
    state: EngineState,
    settings: EngineSettings,
    rng: ChaCha8Rng,
}

impl Engine {
    /// Create an engine with a single empty set.
    pub fn new(settings: EngineSettings) -> Self {
        Self::from_state(EngineState::default(), settings)
    }

    /// Wrap loaded state. A missing or dangling active set is repaired.
    ///
    /// If the layout has no sets but the rarity config still holds per-set
    /// entries (the layout store was lost), the sets are rebuilt from those
    /// entries and their weights are kept. Only a fully empty state gets a
    /// fresh set.
    pub fn from_state(state: EngineState, settings: EngineSettings) -> Self {
        let mut engine = Self {
            state,
            settings,
            rng: ChaCha8Rng::from_entropy(),
        };
        engine.ensure_active_set();
        engine
    }

    /// Use a fixed seed for randomized distributions.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.reseed(seed);
        self
    }

    pub fn reseed(&mut self, seed: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn into_state(self) -> EngineState {
        self.state
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn rarity(&self) -> &RarityConfig {
        &self.state.rarity
    }

    pub fn layout(&self) -> &LayerOrderState {
        &self.state.layout
    }

    pub fn active_set_id(&self) -> Option<&str> {
        self.state.layout.active_set_id.as_deref()
    }

    pub fn active_set(&self) -> Option<&SetInfo> {
        self.state.layout.active_set()
    }

    pub fn set(&self, set_id: &str) -> Option<&SetInfo> {
        self.state.layout.set(set_id)
    }

    /// Sets in display order.
    pub fn sets(&self) -> Vec<&SetInfo> {
        self.state
            .layout
            .ordered_set_ids()
            .iter()
            .filter_map(|id| self.state.layout.set(id))
            .collect()
    }

    pub fn calculator(&self) -> CombinatoricsCalculator {
        CombinatoricsCalculator::new(self.settings.enumeration_limit)
    }

    /// Run the combinatorics calculator against the current state.
    pub fn calculate_possible_combinations(&self, set_id: &str) -> Option<CombinationReport> {
        let set = self.state.layout.set(set_id)?;
        Some(self.calculator().calculate(
            &self.state.rarity,
            set,
            &self.state.incompatibilities,
            &self.state.forced_combinations,
        ))
    }

    /// Store a combinatorics result as the set's cached count.
    pub fn record_combinations(&mut self, set_id: &str, report: &CombinationReport) -> Transition {
        match self.state.layout.set_mut(set_id) {
            Some(set) if set.possible_combinations != report.constrained => {
                set.possible_combinations = report.constrained;
                Transition::none().persist(StoreKind::LayerOrder)
            }
            Some(_) => Transition::none(),
            None => {
                // The set was deleted while the calculation was pending.
                tracing::debug!(set_id, "dropping combinations for deleted set");
                Transition::none()
            }
        }
    }

    /// Replace the whole state, e.g. when restoring a history snapshot.
    pub fn restore(&mut self, state: EngineState) -> Transition {
        self.state = state;
        self.ensure_active_set();
        self.everything_changed()
    }

    /// A transition that saves every store and recomputes every set.
    pub fn everything_changed(&self) -> Transition {
        let mut transition = StoreKind::ALL
            .iter()
            .fold(Transition::none(), |t, store| t.persist(*store))
            .notify_sets();
        for set_id in self.state.layout.ordered_set_ids() {
            transition = transition.recompute(&set_id);
        }
        if let Some(active) = self.active_set_id() {
            transition = transition.preview(active);
        }
        transition
    }

    /// The active set id, or a validation error.
    pub(crate) fn require_active_set(&self) -> Result<SetId> {
        self.state
            .layout
            .active_set()
            .map(|s| s.id.clone())
            .ok_or(ForgeError::NoActiveSet)
    }

    /// The active set id for fail-soft operations; logs when missing.
    pub(crate) fn active_or_warn(&self, operation: &str) -> Option<SetId> {
        let active = self.state.layout.active_set().map(|s| s.id.clone());
        if active.is_none() {
            warn!(operation, "no active set");
        }
        active
    }

    fn ensure_active_set(&mut self) {
        if self.state.layout.sets.is_empty() && self.rebuild_sets_from_rarity() == 0 {
            let (set_id, _) = self.add_set();
            self.state.layout.active_set_id = Some(set_id);
            return;
        }

        let valid = self
            .state
            .layout
            .active_set_id
            .as_deref()
            .map(|id| self.state.layout.sets.contains_key(id))
            .unwrap_or(false);
        if !valid {
            self.state.layout.active_set_id = self.state.layout.first_set_id();
        }
    }
}

/// Log a referential miss and return an empty transition.
pub(crate) fn missing(operation: &str, what: &ForgeError) -> Transition {
    warn!(operation, code = what.error_code(), "{}", what);
    Transition::none()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Engine whose `set1` holds the given layers, each fully enabled with an
    /// equal split.
    pub fn engine_with(layers: &[(&str, &[&str])]) -> Engine {
        let mut engine = Engine::new(EngineSettings::default()).with_seed(11);
        for (name, traits) in layers {
            let _ = engine.register_layer(name, traits.iter().map(|t| t.to_string()).collect());
        }
        engine
    }

    pub fn value(engine: &Engine, layer: &str, trait_name: &str) -> f64 {
        let set_id = engine.active_set_id().unwrap();
        engine
            .rarity()
            .trait_set(layer, trait_name, set_id)
            .map(|c| c.value)
            .unwrap_or(f64::NAN)
    }

    pub fn enabled(engine: &Engine, layer: &str, trait_name: &str) -> bool {
        let set_id = engine.active_set_id().unwrap();
        engine.rarity().is_trait_enabled(set_id, layer, trait_name)
    }

    pub fn sum(engine: &Engine, layer: &str) -> f64 {
        let set_id = engine.active_set_id().unwrap();
        engine.rarity().layer(layer).unwrap().enabled_weight_sum(set_id)
    }
}
