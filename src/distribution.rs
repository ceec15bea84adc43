//! Weight distribution
//!
//! The same four algorithms run over every weighted group in the engine: the
//! traits of a layer within one set, and the filter pipelines. Weights are
//! percentages; a group is balanced when its eligible members sum to 100.
//!
//! Members that are not eligible (disabled traits) never receive weight.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::model::{equal_share, FilterPipeline, TraitSetConfig};

/// Upper bound of a single weight.
pub const MAX_WEIGHT: f64 = 100.0;

/// A member of a weighted group.
pub trait Weighted {
    fn weight(&self) -> f64;

    fn set_weight(&mut self, weight: f64);

    /// Whether this member may hold weight at all.
    fn is_eligible(&self) -> bool {
        true
    }
}

impl<T: Weighted + ?Sized> Weighted for &mut T {
    fn weight(&self) -> f64 {
        (**self).weight()
    }

    fn set_weight(&mut self, weight: f64) {
        (**self).set_weight(weight)
    }

    fn is_eligible(&self) -> bool {
        (**self).is_eligible()
    }
}

impl Weighted for TraitSetConfig {
    fn weight(&self) -> f64 {
        self.value
    }

    fn set_weight(&mut self, weight: f64) {
        self.value = weight;
    }

    fn is_eligible(&self) -> bool {
        self.enabled
    }
}

impl Weighted for FilterPipeline {
    fn weight(&self) -> f64 {
        self.weight
    }

    fn set_weight(&mut self, weight: f64) {
        self.weight = weight;
    }
}

/// Set every member with a nonzero weight to `100 / count`.
pub fn equalize<W: Weighted>(items: &mut [W]) {
    let count = items
        .iter()
        .filter(|w| w.is_eligible() && w.weight() > 0.0)
        .count();
    let share = equal_share(count);

    for item in items.iter_mut() {
        if item.is_eligible() && item.weight() > 0.0 {
            item.set_weight(share);
        }
    }
}

/// Give every eligible member `100 / eligible` and zero the rest.
pub fn reset<W: Weighted>(items: &mut [W]) {
    let count = items.iter().filter(|w| w.is_eligible()).count();
    let share = equal_share(count);

    for item in items.iter_mut() {
        if item.is_eligible() {
            item.set_weight(share);
        } else {
            item.set_weight(0.0);
        }
    }
}

/// Random split of 100 over the eligible members.
///
/// `n - 1` cuts are drawn from the shrinking remainder and the last member
/// takes what is left, so the total is exact up to rounding. The values are
/// then shuffled so early positions are not favoured.
pub fn randomize<W: Weighted, R: Rng + ?Sized>(items: &mut [W], rng: &mut R) {
    let eligible: Vec<usize> = items
        .iter()
        .enumerate()
        .filter(|(_, w)| w.is_eligible())
        .map(|(i, _)| i)
        .collect();

    let mut values = random_split(eligible.len(), rng);
    values.shuffle(rng);

    for (index, value) in eligible.into_iter().zip(values) {
        items[index].set_weight(value);
    }
}

/// `n` values, each rounded down to two decimals except the last, that sum
/// to 100.
fn random_split<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }

    let mut values = Vec::with_capacity(n);
    let mut remaining = MAX_WEIGHT;
    for _ in 0..n - 1 {
        let cut = floor2(rng.gen::<f64>() * remaining);
        values.push(cut);
        remaining -= cut;
    }
    values.push(round2(remaining.max(0.0)));
    values
}

/// Move the weight of the member at `index` to the other eligible members
/// in equal shares and zero it. Only the other members' eligibility is
/// consulted.
pub fn release<W: Weighted>(items: &mut [W], index: usize) {
    let Some(freed) = items.get(index).map(|w| w.weight()) else {
        return;
    };

    let others = items
        .iter()
        .enumerate()
        .filter(|(i, w)| *i != index && w.is_eligible())
        .count();

    if others > 0 {
        let share = freed / others as f64;
        for (i, item) in items.iter_mut().enumerate() {
            if i != index && item.is_eligible() {
                let weight = item.weight();
                item.set_weight(weight + share);
            }
        }
    }

    items[index].set_weight(0.0);
}

/// Set one member's weight, shrinking the others if the group would exceed 100.
///
/// The new value is clamped to `[0, 100]`. If the new total is at most 100
/// nothing else changes, so the group may end up below 100. Otherwise every
/// other member is scaled by `(100 - value) / sum_of_others`.
///
/// Returns the value actually applied.
pub fn update_weight<W: Weighted>(items: &mut [W], index: usize, value: f64) -> f64 {
    let value = value.clamp(0.0, MAX_WEIGHT);
    if index >= items.len() {
        return value;
    }

    let others_sum: f64 = items
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != index)
        .map(|(_, w)| w.weight())
        .sum();

    if value + others_sum > MAX_WEIGHT {
        let budget = (MAX_WEIGHT - value).max(0.0);
        let scale = if budget > 0.0 && others_sum > 0.0 {
            budget / others_sum
        } else {
            0.0
        };

        for (i, item) in items.iter_mut().enumerate() {
            if i != index {
                let weight = item.weight();
                item.set_weight(weight * scale);
            }
        }
    }

    items[index].set_weight(value);
    value
}

/// Sum of the eligible members' weights.
pub fn total<W: Weighted>(items: &[W]) -> f64 {
    items
        .iter()
        .filter(|w| w.is_eligible())
        .map(|w| w.weight())
        .sum()
}

fn floor2(value: f64) -> f64 {
    (value * 100.0).floor() / 100.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use test_case::test_case;

    fn traits(values: &[(bool, f64)]) -> Vec<TraitSetConfig> {
        values
            .iter()
            .map(|&(enabled, value)| TraitSetConfig::new(enabled, value, 0))
            .collect()
    }

    fn weights(items: &[TraitSetConfig]) -> Vec<f64> {
        items.iter().map(|t| t.value).collect()
    }

    #[test]
    fn test_equalize_three_traits() {
        let mut items = traits(&[(true, 10.0), (true, 20.0), (true, 70.0)]);
        equalize(&mut items);

        for value in weights(&items) {
            assert_relative_eq!(value, 100.0 / 3.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_equalize_leaves_zero_weights_alone() {
        let mut items = traits(&[(true, 80.0), (true, 0.0), (false, 0.0), (true, 20.0)]);
        equalize(&mut items);
        assert_eq!(weights(&items), vec![50.0, 0.0, 0.0, 50.0]);
    }

    #[test]
    fn test_reset_restores_every_enabled_member() {
        let mut items = traits(&[(true, 100.0), (true, 0.0), (false, 0.0), (true, 0.0)]);
        reset(&mut items);

        let values = weights(&items);
        assert_relative_eq!(values[0], 100.0 / 3.0, epsilon = 1e-9);
        assert_relative_eq!(values[1], 100.0 / 3.0, epsilon = 1e-9);
        assert_eq!(values[2], 0.0);
        assert_relative_eq!(total(&items), 100.0, epsilon = 1e-9);
    }

    #[test_case(1 ; "single")]
    #[test_case(2 ; "pair")]
    #[test_case(7 ; "seven")]
    #[test_case(40 ; "forty")]
    fn test_randomize_sums_to_hundred(n: usize) {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        for _ in 0..50 {
            let mut items = traits(&vec![(true, 1.0); n]);
            randomize(&mut items, &mut rng);

            assert_eq!(items.len(), n);
            for value in weights(&items) {
                assert!((0.0..=100.0).contains(&value), "out of range: {}", value);
            }
            assert!((total(&items) - 100.0).abs() <= 0.01);
        }
    }

    #[test]
    fn test_randomize_skips_disabled() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut items = traits(&[(true, 50.0), (false, 0.0), (true, 50.0)]);
        randomize(&mut items, &mut rng);

        assert_eq!(items[1].value, 0.0);
        assert!((items[0].value + items[2].value - 100.0).abs() <= 0.01);
    }

    #[test]
    fn test_release_splits_equally() {
        let mut items = traits(&[(true, 100.0 / 3.0), (true, 100.0 / 3.0), (true, 100.0 / 3.0)]);
        release(&mut items, 1);

        let values = weights(&items);
        assert_relative_eq!(values[0], 50.0, epsilon = 1e-9);
        assert_eq!(values[1], 0.0);
        assert_relative_eq!(values[2], 50.0, epsilon = 1e-9);
    }

    #[test]
    fn test_release_is_not_proportional() {
        let mut items = traits(&[(true, 10.0), (true, 30.0), (true, 60.0)]);
        release(&mut items, 0);
        assert_eq!(weights(&items), vec![0.0, 35.0, 65.0]);
    }

    #[test]
    fn test_update_weight_rescales_others() {
        let mut items = traits(&[(true, 50.0), (true, 25.0), (true, 25.0)]);
        let applied = update_weight(&mut items, 0, 80.0);

        assert_eq!(applied, 80.0);
        assert_relative_eq!(items[1].value, 10.0, epsilon = 1e-9);
        assert_relative_eq!(items[2].value, 10.0, epsilon = 1e-9);
        assert_relative_eq!(total(&items), 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_update_weight_below_total_changes_only_target() {
        let mut items = traits(&[(true, 50.0), (true, 25.0), (true, 25.0)]);
        update_weight(&mut items, 0, 20.0);
        assert_eq!(weights(&items), vec![20.0, 25.0, 25.0]);
    }

    #[test]
    fn test_update_weight_clamps_and_zeroes_others() {
        let mut items = traits(&[(true, 50.0), (true, 50.0)]);
        let applied = update_weight(&mut items, 1, 250.0);
        assert_eq!(applied, 100.0);
        assert_eq!(weights(&items), vec![0.0, 100.0]);

        let applied = update_weight(&mut items, 0, -5.0);
        assert_eq!(applied, 0.0);
        assert_eq!(weights(&items), vec![0.0, 100.0]);
    }

    #[test]
    fn test_pipelines_share_the_algorithms() {
        let mut pipelines: Vec<FilterPipeline> = ["grain", "glow"]
            .iter()
            .map(|id| FilterPipeline {
                id: id.to_string(),
                name: id.to_string(),
                weight: 0.0,
            })
            .collect();

        reset(&mut pipelines);
        assert_eq!(pipelines[0].weight, 50.0);
        assert_eq!(pipelines[1].weight, 50.0);
    }
}
