//! Sets, their layer order and the active set.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::rarity::Z_INDEX_SPACING;
use super::SetId;

const SET_ID_PREFIX: &str = "set";

/// Id of the set with the given number (`3` -> `"set3"`).
pub fn set_id_for(number: u32) -> SetId {
    format!("{}{}", SET_ID_PREFIX, number)
}

/// Number encoded in a set id (`"set3"` -> `3`).
pub fn set_number(set_id: &str) -> Option<u32> {
    set_id.strip_prefix(SET_ID_PREFIX)?.parse().ok()
}

/// One independently configured variant of the collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetInfo {
    pub id: SetId,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_name: Option<String>,

    pub created_at: DateTime<Utc>,

    /// Participating layers, bottom to top.
    pub layers: Vec<String>,

    pub nft_count: u32,

    /// z-index distance between consecutive layers, when not the default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_spacing: Option<i64>,

    /// Cached result of the last combinatorics run.
    #[serde(default)]
    pub possible_combinations: u64,
}

impl SetInfo {
    pub fn new(number: u32, layers: Vec<String>, nft_count: u32) -> Self {
        Self {
            id: set_id_for(number),
            name: format!("Set {}", number),
            custom_name: None,
            created_at: Utc::now(),
            layers,
            nft_count,
            z_spacing: None,
            possible_combinations: 0,
        }
    }

    /// Custom name if one is set, generated name otherwise.
    pub fn display_name(&self) -> &str {
        self.custom_name.as_deref().unwrap_or(&self.name)
    }

    pub fn z_spacing(&self) -> i64 {
        self.z_spacing.unwrap_or(Z_INDEX_SPACING)
    }

    /// z-index of the layer at `index`. Saturates instead of overflowing when
    /// a loaded file carries an out-of-range spacing.
    pub fn z_index_at(&self, index: usize) -> i64 {
        i64::try_from(index)
            .unwrap_or(i64::MAX)
            .saturating_mul(self.z_spacing())
    }

    pub fn layer_index(&self, layer: &str) -> Option<usize> {
        self.layers.iter().position(|l| l == layer)
    }
}

/// Display position of a set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetOrder {
    pub id: SetId,
    pub order: usize,
}

/// Sets, their display order, the active set and per-set UI state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerOrderState {
    #[serde(default)]
    pub sets: BTreeMap<SetId, SetInfo>,

    #[serde(default)]
    pub active_set_id: Option<SetId>,

    #[serde(default)]
    pub set_orders: Vec<SetOrder>,

    /// Layers expanded in the editor, per set.
    #[serde(default)]
    pub expanded_layers: BTreeMap<SetId, BTreeSet<String>>,
}

impl LayerOrderState {
    pub fn set(&self, set_id: &str) -> Option<&SetInfo> {
        self.sets.get(set_id)
    }

    pub fn set_mut(&mut self, set_id: &str) -> Option<&mut SetInfo> {
        self.sets.get_mut(set_id)
    }

    pub fn active_set(&self) -> Option<&SetInfo> {
        self.sets.get(self.active_set_id.as_deref()?)
    }

    /// Set ids in display order. Sets missing from `set_orders` follow in
    /// numeric order.
    pub fn ordered_set_ids(&self) -> Vec<SetId> {
        let mut orders: Vec<&SetOrder> = self
            .set_orders
            .iter()
            .filter(|o| self.sets.contains_key(&o.id))
            .collect();
        orders.sort_by_key(|o| o.order);

        let mut ids: Vec<SetId> = orders.into_iter().map(|o| o.id.clone()).collect();
        let mut missing: Vec<&SetId> = self.sets.keys().filter(|id| !ids.contains(*id)).collect();
        missing.sort_by_key(|id| set_number(id).unwrap_or(u32::MAX));
        ids.extend(missing.into_iter().cloned());
        ids
    }

    pub fn first_set_id(&self) -> Option<SetId> {
        self.ordered_set_ids().into_iter().next()
    }

    /// Number for the next set: one past the highest existing number. If the
    /// highest number is `u32::MAX`, the lowest unused number is taken instead.
    pub fn next_set_number(&self) -> u32 {
        let used: BTreeSet<u32> = self.sets.keys().filter_map(|id| set_number(id)).collect();
        let Some(highest) = used.last() else {
            return 1;
        };
        highest
            .checked_add(1)
            .unwrap_or_else(|| (1..u32::MAX).find(|n| !used.contains(n)).unwrap_or(1))
    }

    /// Rewrite `set_orders` from an id list, dropping unknown ids.
    pub fn write_orders(&mut self, ids: &[SetId]) {
        self.set_orders = ids
            .iter()
            .filter(|id| self.sets.contains_key(*id))
            .enumerate()
            .map(|(order, id)| SetOrder {
                id: id.clone(),
                order,
            })
            .collect();
    }

    /// All layer names used by any set, first-seen in display order.
    pub fn layers_in_use(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for id in self.ordered_set_ids() {
            if let Some(set) = self.sets.get(&id) {
                for layer in &set.layers {
                    if !seen.contains(layer) {
                        seen.push(layer.clone());
                    }
                }
            }
        }
        seen
    }

    /// True if any entry is keyed by `set_id`.
    pub fn references_set(&self, set_id: &str) -> bool {
        self.sets.contains_key(set_id)
            || self.active_set_id.as_deref() == Some(set_id)
            || self.set_orders.iter().any(|o| o.id == set_id)
            || self.expanded_layers.contains_key(set_id)
    }
}
