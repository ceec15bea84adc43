//! Filter pipelines
//!
//! The pixel work of a pipeline happens elsewhere; the engine only tracks how
//! often each pipeline is picked.

use serde::{Deserialize, Serialize};

/// A named filter pipeline and its selection weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterPipeline {
    pub id: String,
    pub name: String,
    /// Selection weight, 0 to 100.
    pub weight: f64,
}

/// Every registered pipeline, in display order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterState {
    #[serde(default)]
    pub pipelines: Vec<FilterPipeline>,
}

impl FilterState {
    pub fn position(&self, pipeline_id: &str) -> Option<usize> {
        self.pipelines.iter().position(|p| p.id == pipeline_id)
    }

    pub fn get(&self, pipeline_id: &str) -> Option<&FilterPipeline> {
        self.pipelines.iter().find(|p| p.id == pipeline_id)
    }

    pub fn total_weight(&self) -> f64 {
        self.pipelines.iter().map(|p| p.weight).sum()
    }
}
