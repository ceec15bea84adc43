//! Weight distribution over the traits of a layer and over filter pipelines.

use rand_chacha::ChaCha8Rng;
use tracing::debug;

use super::layers::{entry_index, layer_not_found, trait_not_found};
use super::{missing, Engine, StoreKind, Transition};
use crate::distribution;
use crate::error::{ForgeError, Result};
use crate::model::{FilterPipeline, TraitSetConfig};

impl Engine {
    /// Give every trait of the layer with a nonzero weight an equal share.
    pub fn equalize_layer(&mut self, layer: &str) -> Transition {
        self.distribute_layer("equalize_layer", layer, |entries, _| {
            distribution::equalize(entries)
        })
    }

    /// Random split of 100 over the layer's enabled traits.
    pub fn randomize_layer(&mut self, layer: &str) -> Transition {
        self.distribute_layer("randomize_layer", layer, |entries, rng| {
            distribution::randomize(entries, rng)
        })
    }

    /// Equal share for every enabled trait, including ones edited down to 0.
    pub fn reset_layer(&mut self, layer: &str) -> Transition {
        self.distribute_layer("reset_layer", layer, |entries, _| {
            distribution::reset(entries)
        })
    }

    /// Set one trait's weight in the active set.
    ///
    /// The value is clamped to `[0, 100]`. If the layer would then sum to more
    /// than 100, the other traits shrink proportionally. Returns the value
    /// actually applied.
    pub fn update_trait_weight(
        &mut self,
        layer: &str,
        trait_name: &str,
        value: f64,
    ) -> Result<(f64, Transition)> {
        if !value.is_finite() {
            return Err(ForgeError::InvalidWeight { value });
        }
        let Some(set_id) = self.active_or_warn("update_trait_weight") else {
            return Ok((value, Transition::none()));
        };
        let Some(config) = self.state.rarity.layer_mut(layer) else {
            return Ok((value, missing("update_trait_weight", &layer_not_found(layer))));
        };
        let enabled = match config.trait_set(trait_name, &set_id) {
            Some(entry) => entry.enabled,
            None if config.traits.contains_key(trait_name) => false,
            None => {
                return Ok((
                    value,
                    missing("update_trait_weight", &trait_not_found(layer, trait_name)),
                ))
            }
        };
        if !enabled {
            return Err(ForgeError::TraitNotEnabled {
                set_id,
                layer: layer.to_string(),
                trait_name: trait_name.to_string(),
            });
        }

        let index = entry_index(config, &set_id, trait_name);
        let applied = distribution::update_weight(&mut config.entries_mut(&set_id), index, value);
        debug!(set_id = %set_id, layer, trait_name, applied, "trait weight updated");

        Ok((applied, Transition::weights_changed(&set_id)))
    }

    /// Register a filter pipeline and re-split all pipelines equally.
    pub fn add_pipeline(&mut self, id: &str, name: &str) -> Transition {
        let filters = &mut self.state.filters;
        if filters.position(id).is_some() {
            debug!(pipeline_id = id, "pipeline already registered");
            return Transition::none();
        }
        filters.pipelines.push(FilterPipeline {
            id: id.to_string(),
            name: name.to_string(),
            weight: 0.0,
        });
        distribution::reset(&mut filters.pipelines);
        self.pipelines_changed()
    }

    /// Drop a pipeline; its weight goes to the others in equal shares.
    pub fn remove_pipeline(&mut self, id: &str) -> Transition {
        let filters = &mut self.state.filters;
        let Some(index) = filters.position(id) else {
            return missing("remove_pipeline", &pipeline_not_found(id));
        };
        distribution::release(&mut filters.pipelines, index);
        filters.pipelines.remove(index);
        self.pipelines_changed()
    }

    pub fn equalize_pipelines(&mut self) -> Transition {
        distribution::equalize(&mut self.state.filters.pipelines);
        self.pipelines_changed()
    }

    pub fn randomize_pipelines(&mut self) -> Transition {
        distribution::randomize(&mut self.state.filters.pipelines, &mut self.rng);
        self.pipelines_changed()
    }

    pub fn reset_pipelines(&mut self) -> Transition {
        distribution::reset(&mut self.state.filters.pipelines);
        self.pipelines_changed()
    }

    /// Set one pipeline's weight. Same clamping and shrinking as traits.
    pub fn update_pipeline_weight(&mut self, id: &str, value: f64) -> Result<(f64, Transition)> {
        if !value.is_finite() {
            return Err(ForgeError::InvalidWeight { value });
        }
        let filters = &mut self.state.filters;
        let Some(index) = filters.position(id) else {
            return Ok((value, missing("update_pipeline_weight", &pipeline_not_found(id))));
        };
        let applied = distribution::update_weight(&mut filters.pipelines, index, value);
        Ok((applied, self.pipelines_changed()))
    }

    fn pipelines_changed(&self) -> Transition {
        let transition = Transition::none().persist(StoreKind::Filters);
        match self.active_set_id() {
            Some(set_id) => transition.preview(set_id),
            None => transition,
        }
    }

    fn distribute_layer<F>(&mut self, operation: &str, layer: &str, apply: F) -> Transition
    where
        F: FnOnce(&mut [&mut TraitSetConfig], &mut ChaCha8Rng),
    {
        let Some(set_id) = self.active_or_warn(operation) else {
            return Transition::none();
        };
        let Some(config) = self.state.rarity.layer_mut(layer) else {
            return missing(operation, &layer_not_found(layer));
        };
        apply(&mut config.entries_mut(&set_id), &mut self.rng);
        debug!(set_id = %set_id, layer, operation, "layer weights redistributed");
        Transition::weights_changed(&set_id)
    }
}

fn pipeline_not_found(id: &str) -> ForgeError {
    ForgeError::PipelineNotFound {
        pipeline_id: id.to_string(),
    }
}
