//! Constraint registries
//!
//! Two registries share one shape: incompatibilities (pairs that must never
//! appear together) and forced combinations (pairs that must appear
//! together). Entries are scoped per set and always stored in both
//! directions:
//!
//! ```text
//! registry[set][layer_a][trait_a][layer_b] = {trait_b, ...}
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ForgeError, Result};
use crate::model::{RarityConfig, SetId};

type TargetMap = BTreeMap<String, BTreeSet<String>>;
type SourceMap = BTreeMap<String, BTreeMap<String, TargetMap>>;

/// Which registry a rule lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    Incompatibility,
    ForcedCombination,
}

impl ConstraintKind {
    pub fn label(&self) -> &'static str {
        match self {
            ConstraintKind::Incompatibility => "incompatibility",
            ConstraintKind::ForcedCombination => "forced combination",
        }
    }

    /// The registry a pair must not already be in.
    pub fn opposite(&self) -> ConstraintKind {
        match self {
            ConstraintKind::Incompatibility => ConstraintKind::ForcedCombination,
            ConstraintKind::ForcedCombination => ConstraintKind::Incompatibility,
        }
    }
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A trait addressed by layer and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TraitRef {
    pub layer: String,
    #[serde(rename = "trait")]
    pub trait_name: String,
}

impl TraitRef {
    pub fn new(layer: impl Into<String>, trait_name: impl Into<String>) -> Self {
        Self {
            layer: layer.into(),
            trait_name: trait_name.into(),
        }
    }
}

impl fmt::Display for TraitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.layer, self.trait_name)
    }
}

/// One registered rule, with `a <= b`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ConstraintPair {
    pub a: TraitRef,
    pub b: TraitRef,
}

/// A symmetric, per-set registry of trait pairs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConstraintRegistry {
    entries: BTreeMap<SetId, SourceMap>,
}

impl ConstraintRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `a -> b` is stored for the set.
    pub fn contains(&self, set_id: &str, a: &TraitRef, b: &TraitRef) -> bool {
        self.entries
            .get(set_id)
            .and_then(|layers| layers.get(&a.layer))
            .and_then(|traits| traits.get(&a.trait_name))
            .and_then(|targets| targets.get(&b.layer))
            .map(|names| names.contains(&b.trait_name))
            .unwrap_or(false)
    }

    /// True if the pair is stored in either direction.
    pub fn contains_pair(&self, set_id: &str, a: &TraitRef, b: &TraitRef) -> bool {
        self.contains(set_id, a, b) || self.contains(set_id, b, a)
    }

    /// Store the pair in both directions.
    pub fn insert(&mut self, set_id: &str, a: &TraitRef, b: &TraitRef) {
        self.insert_directed(set_id, a, b);
        self.insert_directed(set_id, b, a);
    }

    fn insert_directed(&mut self, set_id: &str, from: &TraitRef, to: &TraitRef) {
        self.entries
            .entry(set_id.to_string())
            .or_default()
            .entry(from.layer.clone())
            .or_default()
            .entry(from.trait_name.clone())
            .or_default()
            .entry(to.layer.clone())
            .or_default()
            .insert(to.trait_name.clone());
    }

    /// Remove the pair in both directions. Returns true if anything was removed.
    pub fn remove(&mut self, set_id: &str, a: &TraitRef, b: &TraitRef) -> bool {
        let removed = self.remove_directed(set_id, a, b) | self.remove_directed(set_id, b, a);
        if removed {
            self.prune(set_id);
        }
        removed
    }

    fn remove_directed(&mut self, set_id: &str, from: &TraitRef, to: &TraitRef) -> bool {
        self.entries
            .get_mut(set_id)
            .and_then(|layers| layers.get_mut(&from.layer))
            .and_then(|traits| traits.get_mut(&from.trait_name))
            .and_then(|targets| targets.get_mut(&to.layer))
            .map(|names| names.remove(&to.trait_name))
            .unwrap_or(false)
    }

    /// Everything linked to `source` in the set.
    pub fn partners(&self, set_id: &str, source: &TraitRef) -> Vec<TraitRef> {
        self.entries
            .get(set_id)
            .and_then(|layers| layers.get(&source.layer))
            .and_then(|traits| traits.get(&source.trait_name))
            .map(|targets| {
                targets
                    .iter()
                    .flat_map(|(layer, names)| {
                        names.iter().map(move |name| TraitRef::new(layer.clone(), name.clone()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every rule of the set, each listed once.
    pub fn pairs(&self, set_id: &str) -> Vec<ConstraintPair> {
        let mut pairs = BTreeSet::new();
        if let Some(layers) = self.entries.get(set_id) {
            for (layer_a, traits) in layers {
                for (trait_a, targets) in traits {
                    for (layer_b, names) in targets {
                        for trait_b in names {
                            let a = TraitRef::new(layer_a.clone(), trait_a.clone());
                            let b = TraitRef::new(layer_b.clone(), trait_b.clone());
                            let pair = if a <= b {
                                ConstraintPair { a, b }
                            } else {
                                ConstraintPair { a: b, b: a }
                            };
                            pairs.insert(pair);
                        }
                    }
                }
            }
        }
        pairs.into_iter().collect()
    }

    /// Drop entries whose source or target trait is missing or disabled.
    ///
    /// Returns the number of directed entries removed.
    pub fn cleanup(&mut self, config: &RarityConfig) -> usize {
        let mut removed = 0;

        for (set_id, layers) in self.entries.iter_mut() {
            for (layer_a, traits) in layers.iter_mut() {
                traits.retain(|trait_a, targets| {
                    if !config.is_trait_enabled(set_id, layer_a, trait_a) {
                        removed += targets.values().map(BTreeSet::len).sum::<usize>();
                        return false;
                    }
                    for (layer_b, names) in targets.iter_mut() {
                        let before = names.len();
                        names.retain(|trait_b| config.is_trait_enabled(set_id, layer_b, trait_b));
                        removed += before - names.len();
                    }
                    true
                });
            }
        }

        let set_ids: Vec<SetId> = self.entries.keys().cloned().collect();
        for set_id in set_ids {
            self.prune(&set_id);
        }
        removed
    }

    /// Delete every entry scoped to `set_id`.
    pub fn remove_set_references(&mut self, set_id: &str) {
        self.entries.remove(set_id);
    }

    /// Delete every entry that involves `layer`, in every set.
    pub fn remove_layer(&mut self, layer: &str) {
        for layers in self.entries.values_mut() {
            layers.remove(layer);
            for traits in layers.values_mut() {
                for targets in traits.values_mut() {
                    targets.remove(layer);
                }
            }
        }
        let set_ids: Vec<SetId> = self.entries.keys().cloned().collect();
        for set_id in set_ids {
            self.prune(&set_id);
        }
    }

    pub fn references_set(&self, set_id: &str) -> bool {
        self.entries.contains_key(set_id)
    }

    pub fn set_ids(&self) -> impl Iterator<Item = &SetId> {
        self.entries.keys()
    }

    /// Number of distinct rules in the set.
    pub fn len(&self, set_id: &str) -> usize {
        self.pairs(set_id).len()
    }

    pub fn is_empty(&self, set_id: &str) -> bool {
        self.entries
            .get(set_id)
            .map(|layers| layers.is_empty())
            .unwrap_or(true)
    }

    /// Remove empty branches under a set, and the set itself if empty.
    fn prune(&mut self, set_id: &str) {
        let Some(layers) = self.entries.get_mut(set_id) else {
            return;
        };
        for traits in layers.values_mut() {
            for targets in traits.values_mut() {
                targets.retain(|_, names| !names.is_empty());
            }
            traits.retain(|_, targets| !targets.is_empty());
        }
        layers.retain(|_, traits| !traits.is_empty());
        if layers.is_empty() {
            self.entries.remove(set_id);
        }
    }
}

/// Check that a pair may be added to `target`.
///
/// Both traits must be enabled in the set and live in different layers, the
/// pair must not already be in `target`, and it must not be in `opposite` in
/// either direction.
pub fn validate_new_pair(
    config: &RarityConfig,
    set_id: &str,
    kind: ConstraintKind,
    target: &ConstraintRegistry,
    opposite: &ConstraintRegistry,
    a: &TraitRef,
    b: &TraitRef,
) -> Result<()> {
    for side in [a, b] {
        if !config.is_trait_enabled(set_id, &side.layer, &side.trait_name) {
            return Err(ForgeError::TraitNotEnabled {
                set_id: set_id.to_string(),
                layer: side.layer.clone(),
                trait_name: side.trait_name.clone(),
            });
        }
    }

    if a.layer == b.layer {
        return Err(ForgeError::SameLayerConstraint {
            layer: a.layer.clone(),
        });
    }

    if opposite.contains(set_id, a, b) || opposite.contains(set_id, b, a) {
        return Err(ForgeError::ConstraintConflict {
            existing: kind.opposite().label(),
            layer_a: a.layer.clone(),
            trait_a: a.trait_name.clone(),
            layer_b: b.layer.clone(),
            trait_b: b.trait_name.clone(),
        });
    }

    if target.contains_pair(set_id, a, b) {
        return Err(ForgeError::ConstraintAlreadyExists {
            registry: kind.label(),
            layer_a: a.layer.clone(),
            trait_a: a.trait_name.clone(),
            layer_b: b.layer.clone(),
            trait_b: b.trait_name.clone(),
        });
    }

    Ok(())
}
