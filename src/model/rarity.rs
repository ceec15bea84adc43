//! Rarity config schema
//!
//! Layers are keyed by name and shared by every set. Each trait keeps one
//! [`TraitSetConfig`] per set it participates in, and each layer keeps one
//! [`LayerSetState`] per set.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::SetId;

/// Spacing between consecutive layers in the compositing order.
pub const Z_INDEX_SPACING: i64 = 100;

/// Largest spacing a set may use. Keeps `index * spacing` far from `i64::MAX`
/// for any realistic layer count.
pub const MAX_Z_INDEX_SPACING: i64 = 1_000_000;

/// Tolerance used when checking that a layer's weights add up to 100.
pub const WEIGHT_TOLERANCE: f64 = 0.01;

/// Compositing mode used when a trait image is drawn over the layers below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlendMode {
    #[default]
    SourceOver,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    Hue,
    Saturation,
    Color,
    Luminosity,
}

impl BlendMode {
    pub const ALL: [BlendMode; 16] = [
        BlendMode::SourceOver,
        BlendMode::Multiply,
        BlendMode::Screen,
        BlendMode::Overlay,
        BlendMode::Darken,
        BlendMode::Lighten,
        BlendMode::ColorDodge,
        BlendMode::ColorBurn,
        BlendMode::HardLight,
        BlendMode::SoftLight,
        BlendMode::Difference,
        BlendMode::Exclusion,
        BlendMode::Hue,
        BlendMode::Saturation,
        BlendMode::Color,
        BlendMode::Luminosity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BlendMode::SourceOver => "source-over",
            BlendMode::Multiply => "multiply",
            BlendMode::Screen => "screen",
            BlendMode::Overlay => "overlay",
            BlendMode::Darken => "darken",
            BlendMode::Lighten => "lighten",
            BlendMode::ColorDodge => "color-dodge",
            BlendMode::ColorBurn => "color-burn",
            BlendMode::HardLight => "hard-light",
            BlendMode::SoftLight => "soft-light",
            BlendMode::Difference => "difference",
            BlendMode::Exclusion => "exclusion",
            BlendMode::Hue => "hue",
            BlendMode::Saturation => "saturation",
            BlendMode::Color => "color",
            BlendMode::Luminosity => "luminosity",
        }
    }
}

impl fmt::Display for BlendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlendMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        BlendMode::ALL
            .iter()
            .copied()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| format!("unknown blend mode '{}'", s))
    }
}

/// Blend mode and opacity of one trait image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlendSettings {
    pub mode: BlendMode,
    /// 0.0 (transparent) to 1.0 (opaque).
    pub opacity: f64,
}

impl Default for BlendSettings {
    fn default() -> Self {
        Self {
            mode: BlendMode::SourceOver,
            opacity: 1.0,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Per-set configuration of a single trait.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraitSetConfig {
    pub enabled: bool,

    /// Selection weight, 0 to 100.
    pub value: f64,

    pub z_index: i64,

    #[serde(default)]
    pub blend: BlendSettings,

    #[serde(default)]
    pub locked: bool,

    #[serde(default = "default_true")]
    pub include_in_output: bool,
}

impl TraitSetConfig {
    pub fn new(enabled: bool, value: f64, z_index: i64) -> Self {
        Self {
            enabled,
            value,
            z_index,
            blend: BlendSettings::default(),
            locked: false,
            include_in_output: true,
        }
    }

    /// Disable the trait and drop its weight.
    pub fn disable(&mut self) {
        self.enabled = false;
        self.value = 0.0;
    }
}

/// A trait and its configuration in every set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraitConfig {
    #[serde(default)]
    pub sets: BTreeMap<SetId, TraitSetConfig>,
}

/// Per-set state of a layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerSetState {
    pub active: bool,

    #[serde(default)]
    pub locked: bool,

    #[serde(default = "default_true")]
    pub include_in_output: bool,
}

impl LayerSetState {
    pub fn active() -> Self {
        Self {
            active: true,
            locked: false,
            include_in_output: true,
        }
    }
}

/// A layer: its per-set state and its traits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    #[serde(default)]
    pub sets: BTreeMap<SetId, LayerSetState>,

    #[serde(default)]
    pub traits: BTreeMap<String, TraitConfig>,
}

impl LayerConfig {
    /// Create a layer with the given traits and no set entries.
    pub fn with_traits<I, S>(traits: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sets: BTreeMap::new(),
            traits: traits
                .into_iter()
                .map(|name| (name.into(), TraitConfig::default()))
                .collect(),
        }
    }

    pub fn is_active(&self, set_id: &str) -> bool {
        self.sets.get(set_id).map(|s| s.active).unwrap_or(false)
    }

    pub fn trait_set(&self, trait_name: &str, set_id: &str) -> Option<&TraitSetConfig> {
        self.traits.get(trait_name)?.sets.get(set_id)
    }

    pub fn trait_set_mut(&mut self, trait_name: &str, set_id: &str) -> Option<&mut TraitSetConfig> {
        self.traits.get_mut(trait_name)?.sets.get_mut(set_id)
    }

    /// Mutable references to every trait entry of one set, in trait name order.
    pub fn entries_mut(&mut self, set_id: &str) -> Vec<&mut TraitSetConfig> {
        self.traits
            .values_mut()
            .filter_map(|t| t.sets.get_mut(set_id))
            .collect()
    }

    /// Names of the traits enabled in a set, in trait name order.
    pub fn enabled_traits(&self, set_id: &str) -> Vec<&str> {
        self.traits
            .iter()
            .filter(|(_, t)| t.sets.get(set_id).map(|c| c.enabled).unwrap_or(false))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn enabled_count(&self, set_id: &str) -> usize {
        self.enabled_traits(set_id).len()
    }

    /// Sum of the weights of the enabled traits of a set.
    pub fn enabled_weight_sum(&self, set_id: &str) -> f64 {
        self.traits
            .values()
            .filter_map(|t| t.sets.get(set_id))
            .filter(|c| c.enabled)
            .map(|c| c.value)
            .sum()
    }

    /// Set the z-index of every trait entry of a set.
    pub fn set_z_index(&mut self, set_id: &str, z_index: i64) {
        for entry in self.entries_mut(set_id) {
            entry.z_index = z_index;
        }
    }

    /// Give the layer a fresh entry for `set_id`: active, every trait enabled
    /// at an equal share.
    /// True if the layer or any of its traits has an entry for `set_id`.
    pub fn has_set(&self, set_id: &str) -> bool {
        self.sets.contains_key(set_id) || self.traits.values().any(|t| t.sets.contains_key(set_id))
    }

    pub fn init_set_equal(&mut self, set_id: &str, z_index: i64) {
        let share = equal_share(self.traits.len());
        for config in self.traits.values_mut() {
            config
                .sets
                .insert(set_id.to_string(), TraitSetConfig::new(true, share, z_index));
        }
        self.sets.insert(set_id.to_string(), LayerSetState::active());
    }

    /// Copy every per-set entry of `source` to `target`.
    pub fn copy_set(&mut self, source: &str, target: &str) {
        if let Some(state) = self.sets.get(source).cloned() {
            self.sets.insert(target.to_string(), state);
        }
        for config in self.traits.values_mut() {
            if let Some(entry) = config.sets.get(source).cloned() {
                config.sets.insert(target.to_string(), entry);
            }
        }
    }

    /// Remove every entry keyed by `set_id`.
    pub fn remove_set(&mut self, set_id: &str) {
        self.sets.remove(set_id);
        for config in self.traits.values_mut() {
            config.sets.remove(set_id);
        }
    }
}

/// `100 / n`, or 0 for an empty group.
pub fn equal_share(n: usize) -> f64 {
    if n == 0 {
        0.0
    } else {
        100.0 / n as f64
    }
}

/// The whole rarity configuration: layers, traits and forced-trait overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RarityConfig {
    #[serde(default)]
    pub layers: BTreeMap<String, LayerConfig>,

    /// Per set, a layer pinned to a single trait.
    #[serde(default)]
    pub forced_traits: BTreeMap<SetId, BTreeMap<String, String>>,
}

impl RarityConfig {
    pub fn layer(&self, name: &str) -> Option<&LayerConfig> {
        self.layers.get(name)
    }

    pub fn layer_mut(&mut self, name: &str) -> Option<&mut LayerConfig> {
        self.layers.get_mut(name)
    }

    pub fn has_trait(&self, layer: &str, trait_name: &str) -> bool {
        self.layers
            .get(layer)
            .map(|l| l.traits.contains_key(trait_name))
            .unwrap_or(false)
    }

    pub fn trait_set(&self, layer: &str, trait_name: &str, set_id: &str) -> Option<&TraitSetConfig> {
        self.layers.get(layer)?.trait_set(trait_name, set_id)
    }

    /// True when the trait exists and is enabled in the set.
    pub fn is_trait_enabled(&self, set_id: &str, layer: &str, trait_name: &str) -> bool {
        self.trait_set(layer, trait_name, set_id)
            .map(|c| c.enabled)
            .unwrap_or(false)
    }

    pub fn forced_trait(&self, set_id: &str, layer: &str) -> Option<&str> {
        self.forced_traits
            .get(set_id)?
            .get(layer)
            .map(String::as_str)
    }

    /// Remove every entry keyed by `set_id`, overrides included.
    pub fn remove_set(&mut self, set_id: &str) {
        for layer in self.layers.values_mut() {
            layer.remove_set(set_id);
        }
        self.forced_traits.remove(set_id);
    }

    /// True if any layer, trait or override still holds an entry for `set_id`.
    pub fn references_set(&self, set_id: &str) -> bool {
        self.forced_traits.contains_key(set_id)
            || self.layers.values().any(|layer| layer.has_set(set_id))
    }

    /// Every set id that some layer, trait or override is keyed by.
    pub fn set_ids(&self) -> BTreeSet<SetId> {
        let mut ids: BTreeSet<SetId> = self.forced_traits.keys().cloned().collect();
        for layer in self.layers.values() {
            ids.extend(layer.sets.keys().cloned());
            for config in layer.traits.values() {
                ids.extend(config.sets.keys().cloned());
            }
        }
        ids
    }

    /// Layers holding entries for `set_id`, bottom to top by their stored
    /// z-index. Ties and layers without trait entries sort by name.
    pub fn stacked_layers(&self, set_id: &str) -> Vec<String> {
        let mut layers: Vec<(i64, &String)> = self
            .layers
            .iter()
            .filter(|(_, layer)| layer.has_set(set_id))
            .map(|(name, layer)| {
                let z = layer
                    .traits
                    .values()
                    .filter_map(|t| t.sets.get(set_id))
                    .map(|c| c.z_index)
                    .min()
                    .unwrap_or(i64::MAX);
                (z, name)
            })
            .collect();
        layers.sort();
        layers.into_iter().map(|(_, name)| name.clone()).collect()
    }

    /// Drop overrides that point at a layer or trait that no longer exists.
    pub fn prune_forced_traits(&mut self) {
        let layers = &self.layers;
        for overrides in self.forced_traits.values_mut() {
            overrides.retain(|layer, trait_name| {
                layers
                    .get(layer)
                    .map(|l| l.traits.contains_key(trait_name))
                    .unwrap_or(false)
            });
        }
        self.forced_traits.retain(|_, overrides| !overrides.is_empty());
    }
}
