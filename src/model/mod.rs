//! Data model
//!
//! Plain serializable records shared by the engine, the calculators and the
//! persistence gateway.

pub mod filters;
pub mod rarity;
pub mod sets;

/// Set identifier, `"set<N>"`.
pub type SetId = String;

pub use filters::{FilterPipeline, FilterState};
pub use rarity::{
    equal_share, BlendMode, BlendSettings, LayerConfig, LayerSetState, RarityConfig, TraitConfig,
    TraitSetConfig, MAX_Z_INDEX_SPACING, WEIGHT_TOLERANCE, Z_INDEX_SPACING,
};
pub use sets::{set_id_for, set_number, LayerOrderState, SetInfo, SetOrder};
