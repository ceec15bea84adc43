//! Traitforge - Rarity and Combinatorics Engine
//!
//! Traitforge manages the configuration behind a layered generative
//! collection: which traits each layer offers, how likely each trait is in
//! every output set, which traits may or must appear together, and how many
//! distinct outputs the result allows.
//!
//! # Architecture
//!
//! - [`model`]: plain data for the persisted stores (rarity config, sets and
//!   layer order, filter pipelines)
//! - [`distribution`] and [`combinatorics`]: pure weight and counting
//!   algorithms
//! - [`engine`]: the operations. Each one mutates state and returns a
//!   [`Transition`] describing what must be saved, recomputed or notified
//! - [`runtime`]: debounced execution of those effects, undo history and the
//!   optional tokio driver
//! - [`persistence`]: gateways storing each store as a versioned,
//!   checksummed JSON snapshot

pub mod cli;
pub mod combinatorics;
pub mod constraints;
pub mod distribution;
pub mod engine;
pub mod error;
pub mod model;
pub mod persistence;
pub mod runtime;
pub mod settings;

pub use combinatorics::{CombinationReport, CombinatoricsCalculator};
pub use constraints::{ConstraintKind, ConstraintRegistry, TraitRef};
pub use engine::{Effect, Engine, EngineState, Outcome, StoreKind, Transition};
pub use error::{ForgeError, Result};
pub use persistence::{JsonFileGateway, MemoryGateway, PersistenceGateway};
pub use runtime::{Session, SessionEvent};
pub use settings::EngineSettings;
