//! Combinatorics
//!
//! Counts the distinct trait selections a set can produce.
//!
//! The baseline is the product, over the set's active layers, of the number
//! of enabled traits (an empty layer counts as 1). The constrained count
//! narrows each layer to its forced-trait override when one is set, then
//! applies the live incompatibility and forced-combination rules. Layers tied
//! together by rules are counted exactly per connected component; layers with
//! no live rule multiply in freely.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::constraints::{ConstraintRegistry, TraitRef};
use crate::model::{RarityConfig, SetInfo};

/// Result of one combinatorics run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CombinationReport {
    /// Unconstrained product of enabled trait counts.
    pub baseline: u64,
    /// Count after overrides and constraint rules.
    pub constrained: u64,
    /// False if a component was too large to enumerate and its raw size was used.
    pub exact: bool,
}

/// (layer index, trait index) within one calculation.
type Slot = (usize, usize);

struct LayerChoices {
    name: String,
    traits: Vec<String>,
}

#[derive(Default)]
struct LiveRules {
    incompatible: HashSet<(Slot, Slot)>,
    forced: HashMap<Slot, Vec<Slot>>,
}

impl LiveRules {
    /// Whether picking `a` and `b` together breaks a rule.
    fn allowed(&self, a: Slot, b: Slot) -> bool {
        if self.incompatible.contains(&(a, b)) {
            return false;
        }
        self.forced_ok(a, b) && self.forced_ok(b, a)
    }

    /// If `from` forces something in `to`'s layer, `to` must be one of them.
    fn forced_ok(&self, from: Slot, to: Slot) -> bool {
        match self.forced.get(&from) {
            Some(partners) => {
                let mut in_layer = partners.iter().filter(|p| p.0 == to.0).peekable();
                in_layer.peek().is_none() || in_layer.any(|p| *p == to)
            }
            None => true,
        }
    }
}

/// Computes [`CombinationReport`]s from the rarity config and registries.
#[derive(Debug, Clone, Copy)]
pub struct CombinatoricsCalculator {
    enumeration_limit: u64,
}

impl CombinatoricsCalculator {
    pub fn new(enumeration_limit: u64) -> Self {
        Self {
            enumeration_limit: enumeration_limit.max(1),
        }
    }

    /// Unconstrained product over the set's active layers.
    pub fn baseline(config: &RarityConfig, set: &SetInfo) -> u64 {
        set.layers
            .iter()
            .filter_map(|name| config.layer(name))
            .filter(|layer| layer.is_active(&set.id))
            .map(|layer| layer.enabled_count(&set.id).max(1) as u64)
            .fold(1u64, u64::saturating_mul)
    }

    /// Baseline and constrained counts for one set.
    pub fn calculate(
        &self,
        config: &RarityConfig,
        set: &SetInfo,
        incompatibilities: &ConstraintRegistry,
        forced: &ConstraintRegistry,
    ) -> CombinationReport {
        let baseline = Self::baseline(config, set);
        let layers = Self::layer_choices(config, set);

        let index: HashMap<&str, usize> = layers
            .iter()
            .enumerate()
            .map(|(i, l)| (l.name.as_str(), i))
            .collect();
        let slot = |r: &TraitRef| -> Option<Slot> {
            let li = *index.get(r.layer.as_str())?;
            let ti = layers[li].traits.iter().position(|t| *t == r.trait_name)?;
            Some((li, ti))
        };

        let mut rules = LiveRules::default();
        let mut components = UnionFind::new(layers.len());
        let mut linked = vec![false; layers.len()];

        for pair in incompatibilities.pairs(&set.id) {
            if let (Some(a), Some(b)) = (slot(&pair.a), slot(&pair.b)) {
                if a.0 != b.0 {
                    rules.incompatible.insert((a, b));
                    rules.incompatible.insert((b, a));
                    components.union(a.0, b.0);
                    linked[a.0] = true;
                    linked[b.0] = true;
                }
            }
        }
        for pair in forced.pairs(&set.id) {
            if let (Some(a), Some(b)) = (slot(&pair.a), slot(&pair.b)) {
                if a.0 != b.0 {
                    rules.forced.entry(a).or_default().push(b);
                    rules.forced.entry(b).or_default().push(a);
                    components.union(a.0, b.0);
                    linked[a.0] = true;
                    linked[b.0] = true;
                }
            }
        }

        let mut constrained = 1u64;
        let mut exact = true;
        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();

        for (li, layer) in layers.iter().enumerate() {
            if linked[li] {
                groups.entry(components.find(li)).or_default().push(li);
            } else {
                constrained = constrained.saturating_mul(layer.traits.len() as u64);
            }
        }

        for members in groups.values() {
            let raw = members
                .iter()
                .map(|&li| layers[li].traits.len() as u64)
                .fold(1u64, u64::saturating_mul);

            let count = if raw > self.enumeration_limit {
                tracing::debug!(
                    set_id = %set.id,
                    raw,
                    "constrained component too large to enumerate"
                );
                exact = false;
                raw
            } else {
                let mut picks = Vec::with_capacity(members.len());
                count_assignments(&layers, members, &rules, &mut picks)
            };
            constrained = constrained.saturating_mul(count);
        }

        CombinationReport {
            baseline,
            constrained,
            exact,
        }
    }

    /// Active layers that offer at least one choice, narrowed by overrides.
    fn layer_choices(config: &RarityConfig, set: &SetInfo) -> Vec<LayerChoices> {
        set.layers
            .iter()
            .filter_map(|name| {
                let layer = config.layer(name)?;
                if !layer.is_active(&set.id) {
                    return None;
                }

                let traits: Vec<String> = match config.forced_trait(&set.id, name) {
                    Some(pinned) if layer.traits.contains_key(pinned) => vec![pinned.to_string()],
                    _ => layer
                        .enabled_traits(&set.id)
                        .into_iter()
                        .map(str::to_string)
                        .collect(),
                };

                if traits.is_empty() {
                    None
                } else {
                    Some(LayerChoices {
                        name: name.clone(),
                        traits,
                    })
                }
            })
            .collect()
    }
}

/// Depth-first count of valid picks for the layers in `members`.
fn count_assignments(
    layers: &[LayerChoices],
    members: &[usize],
    rules: &LiveRules,
    picks: &mut Vec<Slot>,
) -> u64 {
    let depth = picks.len();
    if depth == members.len() {
        return 1;
    }

    let li = members[depth];
    let mut total = 0u64;
    for ti in 0..layers[li].traits.len() {
        let candidate = (li, ti);
        if picks.iter().all(|&earlier| rules.allowed(earlier, candidate)) {
            picks.push(candidate);
            total = total.saturating_add(count_assignments(layers, members, rules, picks));
            picks.pop();
        }
    }
    total
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[rb] = ra;
        }
    }
}
