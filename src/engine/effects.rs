//! Effects requested by state transitions.
//!
//! Engine operations never save, recompute or notify by themselves. They
//! return a [`Transition`] listing what should happen, and the scheduler
//! decides when.

use crate::error::Result;
use crate::model::SetId;

/// A persisted store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StoreKind {
    RarityConfig,
    LayerOrder,
    Incompatibilities,
    ForcedCombinations,
    Filters,
}

impl StoreKind {
    pub const ALL: [StoreKind; 5] = [
        StoreKind::RarityConfig,
        StoreKind::LayerOrder,
        StoreKind::Incompatibilities,
        StoreKind::ForcedCombinations,
        StoreKind::Filters,
    ];

    /// Stable name used for files and log fields.
    pub fn name(&self) -> &'static str {
        match self {
            StoreKind::RarityConfig => "rarity_config",
            StoreKind::LayerOrder => "layer_order",
            StoreKind::Incompatibilities => "incompatibilities",
            StoreKind::ForcedCombinations => "forced_combinations",
            StoreKind::Filters => "filters",
        }
    }
}

/// One side effect a transition asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Persist(StoreKind),
    RecomputeCombinations(SetId),
    NotifySetsChanged,
    RegeneratePreview(SetId),
}

/// Effects produced by one state transition. Empty means nothing changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transition {
    effects: Vec<Effect>,
}

impl Transition {
    pub fn none() -> Self {
        Self::default()
    }

    /// Weights or activation of a set changed.
    pub fn weights_changed(set_id: &str) -> Self {
        Self::none()
            .persist(StoreKind::RarityConfig)
            .recompute(set_id)
            .preview(set_id)
    }

    pub fn persist(mut self, store: StoreKind) -> Self {
        self.push(Effect::Persist(store));
        self
    }

    pub fn recompute(mut self, set_id: &str) -> Self {
        self.push(Effect::RecomputeCombinations(set_id.to_string()));
        self
    }

    pub fn notify_sets(mut self) -> Self {
        self.push(Effect::NotifySetsChanged);
        self
    }

    pub fn preview(mut self, set_id: &str) -> Self {
        self.push(Effect::RegeneratePreview(set_id.to_string()));
        self
    }

    /// Add an effect unless it is already listed.
    pub fn push(&mut self, effect: Effect) {
        if !self.effects.contains(&effect) {
            self.effects.push(effect);
        }
    }

    pub fn merge(mut self, other: Transition) -> Self {
        for effect in other.effects {
            self.push(effect);
        }
        self
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn is_noop(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn persists(&self, store: StoreKind) -> bool {
        self.effects.contains(&Effect::Persist(store))
    }
}

impl IntoIterator for Transition {
    type Item = Effect;
    type IntoIter = std::vec::IntoIter<Effect>;

    fn into_iter(self) -> Self::IntoIter {
        self.effects.into_iter()
    }
}

/// Return values of engine operations: a transition, optionally alongside a
/// value for the caller.
pub trait Outcome {
    type Output;

    fn split(self) -> (Self::Output, Transition);
}

impl Outcome for Transition {
    type Output = ();

    fn split(self) -> ((), Transition) {
        ((), self)
    }
}

impl<T> Outcome for (T, Transition) {
    type Output = T;

    fn split(self) -> (T, Transition) {
        self
    }
}

impl<O: Outcome> Outcome for Result<O> {
    type Output = Result<O::Output>;

    fn split(self) -> (Self::Output, Transition) {
        match self {
            Ok(outcome) => {
                let (output, transition) = outcome.split();
                (Ok(output), transition)
            }
            Err(e) => (Err(e), Transition::none()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ForgeError;

    #[test]
    fn test_effects_are_deduplicated() {
        let transition = Transition::weights_changed("set1")
            .persist(StoreKind::RarityConfig)
            .recompute("set1");

        assert_eq!(transition.effects().len(), 3);
        assert!(transition.persists(StoreKind::RarityConfig));
    }

    #[test]
    fn test_error_outcome_has_no_effects() {
        let result: Result<Transition> = Err(ForgeError::NoActiveSet);
        let (output, transition) = result.split();
        assert!(output.is_err());
        assert!(transition.is_noop());
    }
}
