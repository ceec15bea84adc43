//! Layer and trait operations on the active set.

use tracing::{debug, info};

use super::{missing, Engine, StoreKind, Transition};
use crate::distribution;
use crate::error::{ForgeError, Result};
use crate::model::{
    BlendMode, LayerConfig, LayerSetState, TraitConfig, TraitSetConfig, MAX_Z_INDEX_SPACING,
};

impl Engine {
    /// Flip a layer's active flag in the active set.
    ///
    /// Activating enables every trait at an equal share. Deactivating
    /// disables every trait and zeroes its weight; the traits themselves stay.
    pub fn toggle_layer_active(&mut self, layer: &str) -> Transition {
        let Some(set_id) = self.active_or_warn("toggle_layer_active") else {
            return Transition::none();
        };
        let z_index = self.z_index_of(&set_id, layer);
        let Some(config) = self.state.rarity.layer_mut(layer) else {
            return missing("toggle_layer_active", &layer_not_found(layer));
        };

        let state = config
            .sets
            .entry(set_id.clone())
            .or_insert_with(|| LayerSetState {
                active: false,
                ..LayerSetState::active()
            });

        if state.active {
            state.active = false;
            for entry in config.entries_mut(&set_id) {
                entry.disable();
            }
            debug!(set_id = %set_id, layer, "layer deactivated");
        } else {
            state.active = true;
            for trait_config in config.traits.values_mut() {
                let entry = trait_config
                    .sets
                    .entry(set_id.clone())
                    .or_insert_with(|| TraitSetConfig::new(false, 0.0, z_index));
                entry.enabled = true;
            }
            distribution::reset(&mut config.entries_mut(&set_id));
            debug!(set_id = %set_id, layer, "layer activated");
        }

        Transition::weights_changed(&set_id)
    }

    /// Flip a trait's enabled flag in the active set.
    ///
    /// Disabling hands the trait's weight to the other enabled traits in
    /// equal shares; disabling the last one deactivates the layer. Enabling
    /// re-splits the layer equally and reactivates it.
    pub fn toggle_trait_enabled(&mut self, layer: &str, trait_name: &str) -> Transition {
        let Some(set_id) = self.active_or_warn("toggle_trait_enabled") else {
            return Transition::none();
        };
        let z_index = self.z_index_of(&set_id, layer);
        let Some(config) = self.state.rarity.layer_mut(layer) else {
            return missing("toggle_trait_enabled", &layer_not_found(layer));
        };
        let Some(trait_config) = config.traits.get_mut(trait_name) else {
            return missing("toggle_trait_enabled", &trait_not_found(layer, trait_name));
        };

        let was_enabled = trait_config
            .sets
            .entry(set_id.clone())
            .or_insert_with(|| TraitSetConfig::new(false, 0.0, z_index))
            .enabled;

        let index = entry_index(config, &set_id, trait_name);
        let mut entries = config.entries_mut(&set_id);

        if was_enabled {
            distribution::release(&mut entries, index);
            entries[index].disable();
            drop(entries);

            if config.enabled_count(&set_id) == 0 {
                if let Some(state) = config.sets.get_mut(&set_id) {
                    state.active = false;
                }
            }
        } else {
            entries[index].enabled = true;
            distribution::reset(&mut entries);
            drop(entries);

            config
                .sets
                .entry(set_id.clone())
                .or_insert_with(LayerSetState::active)
                .active = true;
        }

        Transition::weights_changed(&set_id)
    }

    /// Pin a layer of the active set to one trait.
    pub fn set_forced_trait_override(&mut self, layer: &str, trait_name: &str) -> Transition {
        let Some(set_id) = self.active_or_warn("set_forced_trait_override") else {
            return Transition::none();
        };
        if !self.state.rarity.has_trait(layer, trait_name) {
            return missing(
                "set_forced_trait_override",
                &trait_not_found(layer, trait_name),
            );
        }

        self.state
            .rarity
            .forced_traits
            .entry(set_id.clone())
            .or_default()
            .insert(layer.to_string(), trait_name.to_string());

        Transition::weights_changed(&set_id)
    }

    /// Unpin a layer of the active set.
    pub fn remove_forced_trait_override(&mut self, layer: &str) -> Transition {
        let Some(set_id) = self.active_or_warn("remove_forced_trait_override") else {
            return Transition::none();
        };
        let forced = &mut self.state.rarity.forced_traits;
        let removed = forced
            .get_mut(&set_id)
            .and_then(|overrides| overrides.remove(layer))
            .is_some();
        if !removed {
            return Transition::none();
        }
        if forced.get(&set_id).map(|o| o.is_empty()).unwrap_or(false) {
            forced.remove(&set_id);
        }

        Transition::weights_changed(&set_id)
    }

    /// Move a layer within the active set's order and recompute z-indices.
    pub fn move_layer(&mut self, from: usize, to: usize) -> Result<Transition> {
        let set_id = self.require_active_set()?;
        let set = self
            .state
            .layout
            .set_mut(&set_id)
            .ok_or(ForgeError::NoActiveSet)?;

        let len = set.layers.len();
        if from >= len || to >= len {
            return Err(ForgeError::InvalidLayerOrder {
                reason: format!("move {} -> {} with {} layers", from, to, len),
            });
        }
        if from == to {
            return Ok(Transition::none());
        }

        let layer = set.layers.remove(from);
        set.layers.insert(to, layer);
        Ok(self.apply_z_order(&set_id))
    }

    /// Replace the active set's layer order with a permutation of it.
    pub fn set_ordered_layers(&mut self, ordered: Vec<String>) -> Result<Transition> {
        let set_id = self.require_active_set()?;
        let set = self
            .state
            .layout
            .set_mut(&set_id)
            .ok_or(ForgeError::NoActiveSet)?;

        let mut current = set.layers.clone();
        let mut proposed = ordered.clone();
        current.sort();
        proposed.sort();
        if current != proposed {
            return Err(ForgeError::InvalidLayerOrder {
                reason: "new order must contain exactly the set's layers".to_string(),
            });
        }
        if set.layers == ordered {
            return Ok(Transition::none());
        }

        set.layers = ordered;
        Ok(self.apply_z_order(&set_id))
    }

    /// Change the z-index distance between layers of the active set. The
    /// stacking order stays the same.
    pub fn set_layer_spacing(&mut self, spacing: i64) -> Result<Transition> {
        if !(1..=MAX_Z_INDEX_SPACING).contains(&spacing) {
            return Err(ForgeError::InvalidLayerOrder {
                reason: format!(
                    "spacing must be between 1 and {}, got {}",
                    MAX_Z_INDEX_SPACING, spacing
                ),
            });
        }
        let set_id = self.require_active_set()?;
        if let Some(set) = self.state.layout.set_mut(&set_id) {
            set.z_spacing = Some(spacing);
        }
        Ok(self.apply_z_order(&set_id))
    }

    /// Set the blend mode of every trait of a layer in the active set.
    pub fn update_blend_mode(&mut self, layer: &str, mode: BlendMode) -> Transition {
        let Some(set_id) = self.active_or_warn("update_blend_mode") else {
            return Transition::none();
        };
        let Some(config) = self.state.rarity.layer_mut(layer) else {
            return missing("update_blend_mode", &layer_not_found(layer));
        };
        for entry in config.entries_mut(&set_id) {
            entry.blend.mode = mode;
        }
        Transition::weights_changed(&set_id)
    }

    /// Set the opacity of every trait of a layer in the active set.
    pub fn update_blend_opacity(&mut self, layer: &str, opacity: f64) -> Result<Transition> {
        if !opacity.is_finite() || !(0.0..=1.0).contains(&opacity) {
            return Err(ForgeError::InvalidOpacity { value: opacity });
        }
        let Some(set_id) = self.active_or_warn("update_blend_opacity") else {
            return Ok(Transition::none());
        };
        let Some(config) = self.state.rarity.layer_mut(layer) else {
            return Ok(missing("update_blend_opacity", &layer_not_found(layer)));
        };
        for entry in config.entries_mut(&set_id) {
            entry.blend.opacity = opacity;
        }
        Ok(Transition::weights_changed(&set_id))
    }

    /// Expand or collapse a layer in the editor for the active set.
    pub fn toggle_layer_expanded(&mut self, layer: &str) -> Transition {
        let Some(set_id) = self.active_or_warn("toggle_layer_expanded") else {
            return Transition::none();
        };
        if self.state.rarity.layer(layer).is_none() {
            return missing("toggle_layer_expanded", &layer_not_found(layer));
        }

        let expanded = &mut self.state.layout.expanded_layers;
        let layers = expanded.entry(set_id.clone()).or_default();
        if !layers.remove(layer) {
            layers.insert(layer.to_string());
        }
        if layers.is_empty() {
            expanded.remove(&set_id);
        }
        Transition::none().persist(StoreKind::LayerOrder)
    }

    pub fn set_layer_locked(&mut self, layer: &str, locked: bool) -> Transition {
        self.update_layer_state("set_layer_locked", layer, |state| state.locked = locked)
    }

    pub fn set_layer_include_in_output(&mut self, layer: &str, include: bool) -> Transition {
        self.update_layer_state("set_layer_include_in_output", layer, |state| {
            state.include_in_output = include
        })
    }

    pub fn set_trait_locked(&mut self, layer: &str, trait_name: &str, locked: bool) -> Transition {
        self.update_trait_entry("set_trait_locked", layer, trait_name, |entry| {
            entry.locked = locked
        })
    }

    pub fn set_trait_include_in_output(
        &mut self,
        layer: &str,
        trait_name: &str,
        include: bool,
    ) -> Transition {
        self.update_trait_entry("set_trait_include_in_output", layer, trait_name, |entry| {
            entry.include_in_output = include
        })
    }

    /// Add a layer, or add any missing traits to an existing one.
    ///
    /// A new layer joins the top of every set, active with an equal split.
    pub fn register_layer(&mut self, name: &str, traits: Vec<String>) -> Transition {
        if self.state.rarity.layer(name).is_some() {
            return traits
                .iter()
                .fold(Transition::none(), |t, trait_name| {
                    t.merge(self.add_trait(name, trait_name))
                });
        }

        let mut config = LayerConfig::with_traits(traits);
        let set_ids = self.state.layout.ordered_set_ids();
        for set_id in &set_ids {
            if let Some(set) = self.state.layout.set_mut(set_id) {
                let index = match set.layer_index(name) {
                    Some(index) => index,
                    None => {
                        set.layers.push(name.to_string());
                        set.layers.len() - 1
                    }
                };
                config.init_set_equal(set_id, set.z_index_at(index));
            }
        }
        self.state.rarity.layers.insert(name.to_string(), config);
        info!(layer = name, sets = set_ids.len(), "layer registered");

        set_ids.iter().fold(
            Transition::none()
                .persist(StoreKind::RarityConfig)
                .persist(StoreKind::LayerOrder)
                .notify_sets(),
            |t, set_id| t.recompute(set_id).preview(set_id),
        )
    }

    /// Add a trait to a layer. In every set where the layer is active the
    /// trait is enabled and the layer re-split equally.
    pub fn add_trait(&mut self, layer: &str, trait_name: &str) -> Transition {
        let set_ids = self.state.layout.ordered_set_ids();
        let z_indices: Vec<i64> = set_ids
            .iter()
            .map(|set_id| self.z_index_of(set_id, layer))
            .collect();
        let Some(config) = self.state.rarity.layer_mut(layer) else {
            return missing("add_trait", &layer_not_found(layer));
        };
        if config.traits.contains_key(trait_name) {
            return Transition::none();
        }

        let mut trait_config = TraitConfig::default();
        let mut touched = Vec::new();
        for (set_id, z_index) in set_ids.iter().zip(z_indices) {
            if let Some(state) = config.sets.get(set_id) {
                trait_config.sets.insert(
                    set_id.clone(),
                    TraitSetConfig::new(state.active, 0.0, z_index),
                );
                if state.active {
                    touched.push(set_id.clone());
                }
            }
        }
        config.traits.insert(trait_name.to_string(), trait_config);
        for set_id in &touched {
            distribution::reset(&mut config.entries_mut(set_id));
        }

        set_ids.iter().fold(
            Transition::none().persist(StoreKind::RarityConfig),
            |t, set_id| t.recompute(set_id).preview(set_id),
        )
    }

    /// Remove a trait from a layer in every set. Its weight goes to the other
    /// enabled traits; rules and overrides that named it are dropped.
    pub fn remove_trait(&mut self, layer: &str, trait_name: &str) -> Transition {
        let Some(config) = self.state.rarity.layer_mut(layer) else {
            return missing("remove_trait", &layer_not_found(layer));
        };
        let Some(trait_config) = config.traits.get(trait_name) else {
            return missing("remove_trait", &trait_not_found(layer, trait_name));
        };

        let set_ids: Vec<String> = trait_config.sets.keys().cloned().collect();
        for set_id in &set_ids {
            let index = entry_index(config, set_id, trait_name);
            distribution::release(&mut config.entries_mut(set_id), index);
        }
        config.traits.remove(trait_name);
        for set_id in &set_ids {
            if config.enabled_count(set_id) == 0 {
                if let Some(state) = config.sets.get_mut(set_id) {
                    state.active = false;
                }
            }
        }

        self.state.rarity.prune_forced_traits();
        self.state.incompatibilities.cleanup(&self.state.rarity);
        self.state.forced_combinations.cleanup(&self.state.rarity);

        set_ids.iter().fold(
            Transition::none()
                .persist(StoreKind::RarityConfig)
                .persist(StoreKind::Incompatibilities)
                .persist(StoreKind::ForcedCombinations),
            |t, set_id| t.recompute(set_id).preview(set_id),
        )
    }

    /// Remove a layer everywhere: config, set orders, UI state, overrides and rules.
    pub fn remove_layer(&mut self, layer: &str) -> Transition {
        if self.state.rarity.layers.remove(layer).is_none() {
            return missing("remove_layer", &layer_not_found(layer));
        }

        let set_ids = self.state.layout.ordered_set_ids();
        for set_id in &set_ids {
            if let Some(set) = self.state.layout.set_mut(set_id) {
                set.layers.retain(|l| l != layer);
            }
            self.apply_z_order(set_id);
        }
        for expanded in self.state.layout.expanded_layers.values_mut() {
            expanded.remove(layer);
        }
        self.state
            .layout
            .expanded_layers
            .retain(|_, layers| !layers.is_empty());
        self.state.rarity.prune_forced_traits();
        self.state.incompatibilities.remove_layer(layer);
        self.state.forced_combinations.remove_layer(layer);
        info!(layer, "layer removed");

        set_ids.iter().fold(
            StoreKind::ALL
                .iter()
                .filter(|s| **s != StoreKind::Filters)
                .fold(Transition::none(), |t, s| t.persist(*s))
                .notify_sets(),
            |t, set_id| t.recompute(set_id).preview(set_id),
        )
    }

    /// Rewrite every trait z-index of a set from its layer order.
    pub(crate) fn apply_z_order(&mut self, set_id: &str) -> Transition {
        let Some(set) = self.state.layout.set(set_id) else {
            return Transition::none();
        };
        let order: Vec<(String, i64)> = set
            .layers
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), set.z_index_at(i)))
            .collect();

        for (name, z_index) in order {
            if let Some(config) = self.state.rarity.layer_mut(&name) {
                config.set_z_index(set_id, z_index);
            }
        }

        Transition::none()
            .persist(StoreKind::RarityConfig)
            .persist(StoreKind::LayerOrder)
            .recompute(set_id)
            .preview(set_id)
    }

    /// z-index a layer's traits should have in a set.
    pub(crate) fn z_index_of(&self, set_id: &str, layer: &str) -> i64 {
        self.state
            .layout
            .set(set_id)
            .and_then(|set| set.layer_index(layer).map(|i| set.z_index_at(i)))
            .unwrap_or(0)
    }

    fn update_layer_state<F>(&mut self, operation: &str, layer: &str, update: F) -> Transition
    where
        F: FnOnce(&mut LayerSetState),
    {
        let Some(set_id) = self.active_or_warn(operation) else {
            return Transition::none();
        };
        let Some(state) = self
            .state
            .rarity
            .layer_mut(layer)
            .and_then(|config| config.sets.get_mut(&set_id))
        else {
            return missing(operation, &layer_not_found(layer));
        };
        update(state);
        Transition::none().persist(StoreKind::RarityConfig).preview(&set_id)
    }

    fn update_trait_entry<F>(
        &mut self,
        operation: &str,
        layer: &str,
        trait_name: &str,
        update: F,
    ) -> Transition
    where
        F: FnOnce(&mut TraitSetConfig),
    {
        let Some(set_id) = self.active_or_warn(operation) else {
            return Transition::none();
        };
        let Some(entry) = self
            .state
            .rarity
            .layer_mut(layer)
            .and_then(|config| config.trait_set_mut(trait_name, &set_id))
        else {
            return missing(operation, &trait_not_found(layer, trait_name));
        };
        update(entry);
        Transition::none().persist(StoreKind::RarityConfig).preview(&set_id)
    }
}

/// Position of a trait among the set's entries as returned by `entries_mut`.
pub(crate) fn entry_index(config: &LayerConfig, set_id: &str, trait_name: &str) -> usize {
    config
        .traits
        .iter()
        .filter(|(_, t)| t.sets.contains_key(set_id))
        .position(|(name, _)| name == trait_name)
        .unwrap_or(usize::MAX)
}

pub(crate) fn layer_not_found(layer: &str) -> ForgeError {
    ForgeError::LayerNotFound {
        layer: layer.to_string(),
    }
}

pub(crate) fn trait_not_found(layer: &str, trait_name: &str) -> ForgeError {
    ForgeError::TraitNotFound {
        layer: layer.to_string(),
        trait_name: trait_name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_disable_trait_splits_weight_equally() {
        let mut engine = engine_with(&[("Background", &["A", "B", "C"])]);
        let _ = engine.equalize_layer("Background");
        assert_relative_eq!(value(&engine, "Background", "B"), 100.0 / 3.0, epsilon = 1e-9);

        let transition = engine.toggle_trait_enabled("Background", "B");
        assert!(transition.persists(StoreKind::RarityConfig));
        assert_relative_eq!(value(&engine, "Background", "A"), 50.0, epsilon = 1e-9);
        assert_relative_eq!(value(&engine, "Background", "C"), 50.0, epsilon = 1e-9);
        assert_eq!(value(&engine, "Background", "B"), 0.0);
        assert!(!enabled(&engine, "Background", "B"));
    }

    #[test]
    fn test_reenable_equalizes_instead_of_restoring() {
        let mut engine = engine_with(&[("bg", &["a", "b", "c"])]);
        let _ = engine.update_trait_weight("bg", "a", 80.0);
        let _ = engine.toggle_trait_enabled("bg", "b");
        let _ = engine.toggle_trait_enabled("bg", "b");

        assert!(enabled(&engine, "bg", "b"));
        for name in ["a", "b", "c"] {
            assert_relative_eq!(value(&engine, "bg", name), 100.0 / 3.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_disabling_last_trait_deactivates_layer() {
        let mut engine = engine_with(&[("bg", &["a", "b"])]);
        let _ = engine.toggle_trait_enabled("bg", "a");
        let _ = engine.toggle_trait_enabled("bg", "b");
        assert!(!engine.rarity().layer("bg").unwrap().is_active("set1"));

        let _ = engine.toggle_trait_enabled("bg", "b");
        assert!(engine.rarity().layer("bg").unwrap().is_active("set1"));
        assert_eq!(value(&engine, "bg", "b"), 100.0);
        assert_eq!(value(&engine, "bg", "a"), 0.0);
    }

    #[test]
    fn test_toggle_layer_active_round_trip() {
        let mut engine = engine_with(&[("bg", &["a", "b", "c", "d"])]);
        let _ = engine.toggle_trait_enabled("bg", "d");

        let _ = engine.toggle_layer_active("bg");
        assert!(!engine.rarity().layer("bg").unwrap().is_active("set1"));
        assert_eq!(sum(&engine, "bg"), 0.0);
        assert_eq!(engine.rarity().layer("bg").unwrap().traits.len(), 4);

        let _ = engine.toggle_layer_active("bg");
        for name in ["a", "b", "c", "d"] {
            assert!(enabled(&engine, "bg", name));
            assert_eq!(value(&engine, "bg", name), 25.0);
        }
    }

    #[test]
    fn test_unknown_references_are_noops() {
        let mut engine = engine_with(&[("bg", &["a"])]);
        let before = engine.state().clone();

        assert!(engine.toggle_layer_active("nope").is_noop());
        assert!(engine.toggle_trait_enabled("bg", "nope").is_noop());
        assert!(engine.set_forced_trait_override("bg", "nope").is_noop());
        assert!(engine.update_blend_mode("nope", BlendMode::Screen).is_noop());
        assert_eq!(engine.state(), &before);
    }

    #[test]
    fn test_move_layer_rewrites_z_index() {
        let mut engine = engine_with(&[("bg", &["a"]), ("body", &["b"]), ("eyes", &["c"])]);
        let transition = engine.move_layer(0, 2).unwrap();
        assert!(transition.persists(StoreKind::LayerOrder));

        assert_eq!(engine.active_set().unwrap().layers, vec!["body", "eyes", "bg"]);
        let z = |layer: &str, t: &str| engine.rarity().trait_set(layer, t, "set1").unwrap().z_index;
        assert_eq!(z("body", "b"), 0);
        assert_eq!(z("eyes", "c"), 100);
        assert_eq!(z("bg", "a"), 200);
        assert_eq!(value(&engine, "bg", "a"), 100.0);
    }

    #[test]
    fn test_move_layer_out_of_range_rejected() {
        let mut engine = engine_with(&[("bg", &["a"])]);
        let err = engine.move_layer(0, 3).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_LAYER_ORDER");
    }

    #[test]
    fn test_set_ordered_layers_requires_permutation() {
        let mut engine = engine_with(&[("bg", &["a"]), ("eyes", &["c"])]);
        assert!(engine.set_ordered_layers(vec!["eyes".into()]).is_err());

        engine
            .set_ordered_layers(vec!["eyes".into(), "bg".into()])
            .unwrap();
        assert_eq!(engine.rarity().trait_set("bg", "a", "set1").unwrap().z_index, 100);
    }

    #[test]
    fn test_layer_spacing_keeps_order() {
        let mut engine = engine_with(&[("bg", &["a"]), ("eyes", &["c"])]);
        engine.set_layer_spacing(10).unwrap();
        assert_eq!(engine.rarity().trait_set("eyes", "c", "set1").unwrap().z_index, 10);
        assert!(engine.set_layer_spacing(0).is_err());
    }

    #[test]
    fn test_blend_updates_every_trait() {
        let mut engine = engine_with(&[("bg", &["a", "b"])]);
        let _ = engine.update_blend_mode("bg", BlendMode::Multiply);
        engine.update_blend_opacity("bg", 0.4).unwrap();

        for name in ["a", "b"] {
            let entry = engine.rarity().trait_set("bg", name, "set1").unwrap();
            assert_eq!(entry.blend.mode, BlendMode::Multiply);
            assert_eq!(entry.blend.opacity, 0.4);
        }
        assert!(engine.update_blend_opacity("bg", 1.5).is_err());
    }

    #[test]
    fn test_forced_trait_override() {
        let mut engine = engine_with(&[("bg", &["a", "b"])]);
        let _ = engine.set_forced_trait_override("bg", "b");
        assert_eq!(engine.rarity().forced_trait("set1", "bg"), Some("b"));
        // Weights are untouched.
        assert_eq!(value(&engine, "bg", "a"), 50.0);

        let _ = engine.remove_forced_trait_override("bg");
        assert!(engine.rarity().forced_traits.is_empty());
        assert!(engine.remove_forced_trait_override("bg").is_noop());
    }

    #[test]
    fn test_add_and_remove_trait() {
        let mut engine = engine_with(&[("bg", &["a", "b"])]);
        let _ = engine.add_trait("bg", "c");
        for name in ["a", "b", "c"] {
            assert_relative_eq!(value(&engine, "bg", name), 100.0 / 3.0, epsilon = 1e-9);
        }

        let _ = engine.remove_trait("bg", "a");
        assert!(!engine.rarity().has_trait("bg", "a"));
        assert_relative_eq!(sum(&engine, "bg"), 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_remove_layer_purges_everything() {
        let mut engine = engine_with(&[("bg", &["a"]), ("eyes", &["x", "y"])]);
        engine.add_incompatibility("bg", "a", "eyes", "x").unwrap();
        let _ = engine.set_forced_trait_override("eyes", "y");
        let _ = engine.toggle_layer_expanded("eyes");

        let _ = engine.remove_layer("eyes");
        assert!(engine.rarity().layer("eyes").is_none());
        assert_eq!(engine.active_set().unwrap().layers, vec!["bg"]);
        assert!(engine.rarity().forced_traits.is_empty());
        assert!(engine.state().incompatibilities.is_empty("set1"));
        assert!(engine.layout().expanded_layers.is_empty());
    }

    #[test]
    fn test_flags_are_stored_per_set() {
        let mut engine = engine_with(&[("bg", &["a"])]);
        let _ = engine.set_layer_locked("bg", true);
        let _ = engine.set_trait_include_in_output("bg", "a", false);

        let layer = engine.rarity().layer("bg").unwrap();
        assert!(layer.sets["set1"].locked);
        assert!(!layer.trait_set("a", "set1").unwrap().include_in_output);
    }
}
