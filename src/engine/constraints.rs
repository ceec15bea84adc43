//! Incompatibility and forced-combination rules of the active set.

use tracing::{debug, info};

use super::{Engine, StoreKind, Transition};
use crate::constraints::{validate_new_pair, ConstraintKind, TraitRef};
use crate::error::Result;

fn store_for(kind: ConstraintKind) -> StoreKind {
    match kind {
        ConstraintKind::Incompatibility => StoreKind::Incompatibilities,
        ConstraintKind::ForcedCombination => StoreKind::ForcedCombinations,
    }
}

impl Engine {
    /// Register a rule between two enabled traits of different layers.
    ///
    /// Fails without touching either registry if the pair is already in the
    /// target registry or in the opposite one.
    pub fn add_constraint(
        &mut self,
        kind: ConstraintKind,
        a: &TraitRef,
        b: &TraitRef,
    ) -> Result<Transition> {
        let set_id = self.require_active_set()?;
        validate_new_pair(
            &self.state.rarity,
            &set_id,
            kind,
            self.state.registry(kind),
            self.state.registry(kind.opposite()),
            a,
            b,
        )?;

        self.state.registry_mut(kind).insert(&set_id, a, b);
        debug!(set_id = %set_id, %kind, %a, %b, "constraint added");

        Ok(Transition::none()
            .persist(store_for(kind))
            .recompute(&set_id))
    }

    pub fn add_incompatibility(
        &mut self,
        layer_a: &str,
        trait_a: &str,
        layer_b: &str,
        trait_b: &str,
    ) -> Result<Transition> {
        self.add_constraint(
            ConstraintKind::Incompatibility,
            &TraitRef::new(layer_a, trait_a),
            &TraitRef::new(layer_b, trait_b),
        )
    }

    pub fn add_forced_combination(
        &mut self,
        layer_a: &str,
        trait_a: &str,
        layer_b: &str,
        trait_b: &str,
    ) -> Result<Transition> {
        self.add_constraint(
            ConstraintKind::ForcedCombination,
            &TraitRef::new(layer_a, trait_a),
            &TraitRef::new(layer_b, trait_b),
        )
    }

    /// Remove a rule from the active set in both directions.
    pub fn remove_constraint(&mut self, kind: ConstraintKind, a: &TraitRef, b: &TraitRef) -> Transition {
        let Some(set_id) = self.active_or_warn("remove_constraint") else {
            return Transition::none();
        };
        if !self.state.registry_mut(kind).remove(&set_id, a, b) {
            debug!(set_id = %set_id, %kind, %a, %b, "no such constraint");
            return Transition::none();
        }
        Transition::none()
            .persist(store_for(kind))
            .recompute(&set_id)
    }

    /// Drop rules that name a trait which no longer exists or is disabled.
    pub fn cleanup_constraints(&mut self) -> Transition {
        let rarity = &self.state.rarity;
        let removed_incompatible = self.state.incompatibilities.cleanup(rarity);
        let removed_forced = self.state.forced_combinations.cleanup(rarity);
        if removed_incompatible + removed_forced == 0 {
            return Transition::none();
        }
        info!(
            incompatibilities = removed_incompatible,
            forced_combinations = removed_forced,
            "stale constraints removed"
        );

        let mut transition = Transition::none();
        if removed_incompatible > 0 {
            transition = transition.persist(StoreKind::Incompatibilities);
        }
        if removed_forced > 0 {
            transition = transition.persist(StoreKind::ForcedCombinations);
        }
        self.state
            .layout
            .ordered_set_ids()
            .iter()
            .fold(transition, |t, set_id| t.recompute(set_id))
    }
}
