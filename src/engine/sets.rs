//! Set lifecycle: add, duplicate, delete, select, rename and reorder.

use tracing::{debug, info, warn};

use super::{missing, Engine, StoreKind, Transition};
use crate::error::{ForgeError, Result};
use crate::model::{set_id_for, set_number, SetId, SetInfo};

impl Engine {
    /// Create a set holding every known layer at an equal split.
    ///
    /// Layers keep the order they have in existing sets; layers no set uses
    /// yet follow alphabetically. The active set does not change unless
    /// there was none.
    pub fn add_set(&mut self) -> (SetId, Transition) {
        let number = self.state.layout.next_set_number();
        let set = SetInfo::new(number, self.known_layer_order(), self.settings.default_nft_count);
        let set_id = set.id.clone();

        for (index, name) in set.layers.iter().enumerate() {
            if let Some(config) = self.state.rarity.layer_mut(name) {
                if config.has_set(&set_id) {
                    warn!(set_id = %set_id, layer = %name, "keeping existing set entries");
                    continue;
                }
                config.init_set_equal(&set_id, set.z_index_at(index));
            }
        }

        self.insert_set(set);
        info!(set_id = %set_id, "set added");

        let transition = self.set_added(&set_id);
        (set_id, transition)
    }

    /// Clone a set's layers, weights, flags, blend and z-indices into a new
    /// set. Rules and overrides are not copied.
    pub fn duplicate_set(&mut self, source_number: u32) -> (Option<SetId>, Transition) {
        let source_id = set_id_for(source_number);
        let Some(source) = self.state.layout.set(&source_id) else {
            return (None, missing("duplicate_set", &set_not_found(&source_id)));
        };

        let number = self.state.layout.next_set_number();
        let mut set = SetInfo::new(number, source.layers.clone(), source.nft_count);
        set.z_spacing = source.z_spacing;
        set.possible_combinations = source.possible_combinations;
        let set_id = set.id.clone();

        for config in self.state.rarity.layers.values_mut() {
            config.copy_set(&source_id, &set_id);
        }

        self.insert_set(set);
        info!(source = %source_id, set_id = %set_id, "set duplicated");

        let transition = self.set_added(&set_id);
        (Some(set_id), transition)
    }

    /// Delete a set and every entry keyed by it.
    ///
    /// The last remaining set cannot be deleted. If the deleted set was
    /// active, the first remaining set in display order becomes active.
    pub fn delete_set(&mut self, number: u32) -> Result<Transition> {
        let set_id = set_id_for(number);
        if !self.state.layout.sets.contains_key(&set_id) {
            return Ok(missing("delete_set", &set_not_found(&set_id)));
        }
        if self.state.layout.sets.len() == 1 {
            return Err(ForgeError::LastSet { set_id });
        }

        let remaining: Vec<SetId> = self
            .state
            .layout
            .ordered_set_ids()
            .into_iter()
            .filter(|id| *id != set_id)
            .collect();

        let layout = &mut self.state.layout;
        layout.sets.remove(&set_id);
        layout.expanded_layers.remove(&set_id);
        layout.write_orders(&remaining);
        let was_active = layout.active_set_id.as_deref() == Some(set_id.as_str());
        if was_active {
            layout.active_set_id = layout.first_set_id();
        }

        self.state.rarity.remove_set(&set_id);
        self.state.incompatibilities.remove_set_references(&set_id);
        self.state.forced_combinations.remove_set_references(&set_id);
        info!(set_id = %set_id, was_active, "set deleted");

        let mut transition = StoreKind::ALL
            .iter()
            .filter(|s| **s != StoreKind::Filters)
            .fold(Transition::none(), |t, s| t.persist(*s))
            .notify_sets();
        if let Some(active) = self.active_set_id() {
            if was_active {
                transition = transition.recompute(active).preview(active);
            }
        }
        Ok(transition)
    }

    /// Make a set the active one.
    pub fn select_set(&mut self, set_id: &str) -> Transition {
        if !self.state.layout.sets.contains_key(set_id) {
            return missing("select_set", &set_not_found(set_id));
        }
        if self.active_set_id() == Some(set_id) {
            return Transition::none();
        }

        self.state.layout.active_set_id = Some(set_id.to_string());
        debug!(set_id, "set selected");
        Transition::none()
            .persist(StoreKind::LayerOrder)
            .notify_sets()
            .recompute(set_id)
            .preview(set_id)
    }

    /// Set or clear a set's custom display name.
    pub fn rename_set(&mut self, set_id: &str, custom_name: Option<String>) -> Transition {
        let Some(set) = self.state.layout.set_mut(set_id) else {
            return missing("rename_set", &set_not_found(set_id));
        };
        set.custom_name = custom_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());
        Transition::none()
            .persist(StoreKind::LayerOrder)
            .notify_sets()
    }

    /// Change how many outputs a set should generate.
    pub fn set_nft_count(&mut self, set_id: &str, nft_count: u32) -> Transition {
        let Some(set) = self.state.layout.set_mut(set_id) else {
            return missing("set_nft_count", &set_not_found(set_id));
        };
        set.nft_count = nft_count;
        Transition::none()
            .persist(StoreKind::LayerOrder)
            .notify_sets()
    }

    /// Move a set within the display order.
    pub fn reorder_sets(&mut self, from: usize, to: usize) -> Result<Transition> {
        let mut ids = self.state.layout.ordered_set_ids();
        if from >= ids.len() || to >= ids.len() {
            return Err(ForgeError::InvalidSetOrder {
                reason: format!("move {} -> {} with {} sets", from, to, ids.len()),
            });
        }
        if from == to {
            return Ok(Transition::none());
        }

        let id = ids.remove(from);
        ids.insert(to, id);
        self.state.layout.write_orders(&ids);
        Ok(Transition::none()
            .persist(StoreKind::LayerOrder)
            .notify_sets())
    }

    /// Recreate set records for every set id the rarity config still uses.
    /// Existing layer and trait entries are kept as they are. Returns the
    /// number of sets rebuilt.
    pub(crate) fn rebuild_sets_from_rarity(&mut self) -> usize {
        let mut rebuilt = Vec::new();
        for set_id in self.state.rarity.set_ids() {
            let Some(number) = set_number(&set_id) else {
                warn!(set_id = %set_id, "skipping entries under an unrecognised set id");
                continue;
            };
            let layers = self.state.rarity.stacked_layers(&set_id);
            let set = SetInfo::new(number, layers, self.settings.default_nft_count);
            rebuilt.push(set.id.clone());
            self.state.layout.sets.insert(set.id.clone(), set);
        }
        if rebuilt.is_empty() {
            return 0;
        }

        let ids = self.state.layout.ordered_set_ids();
        self.state.layout.write_orders(&ids);
        warn!(sets = ?rebuilt, "set layout missing, rebuilt from rarity config");
        rebuilt.len()
    }

    /// Layer order for a new set.
    fn known_layer_order(&self) -> Vec<String> {
        let mut layers = self.state.layout.layers_in_use();
        let mut rest: Vec<String> = self
            .state
            .rarity
            .layers
            .keys()
            .filter(|name| !layers.contains(*name))
            .cloned()
            .collect();
        rest.sort();
        layers.extend(rest);
        layers.retain(|name| self.state.rarity.layers.contains_key(name));
        layers
    }

    fn insert_set(&mut self, set: SetInfo) {
        let layout = &mut self.state.layout;
        let mut ids = layout.ordered_set_ids();
        ids.push(set.id.clone());
        if layout.active_set_id.is_none() {
            layout.active_set_id = Some(set.id.clone());
        }
        layout.sets.insert(set.id.clone(), set);
        layout.write_orders(&ids);
    }

    fn set_added(&self, set_id: &str) -> Transition {
        Transition::none()
            .persist(StoreKind::RarityConfig)
            .persist(StoreKind::LayerOrder)
            .notify_sets()
            .recompute(set_id)
    }
}

fn set_not_found(set_id: &str) -> ForgeError {
    ForgeError::SetNotFound {
        set_id: set_id.to_string(),
    }
}
