//! CLI Module
//!
//! Command-line interface for editing a traitforge project directory.

pub mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::constraints::ConstraintKind;

/// Traitforge - rarity, constraint and combinatorics editor
#[derive(Parser, Debug)]
#[command(name = "traitforge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Project directory holding the store files
    #[arg(short, long, global = true, default_value = ".")]
    pub project: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Which constraint registry a command targets.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleKind {
    Incompatible,
    Forced,
}

impl From<RuleKind> for ConstraintKind {
    fn from(kind: RuleKind) -> Self {
        match kind {
            RuleKind::Incompatible => ConstraintKind::Incompatibility,
            RuleKind::Forced => ConstraintKind::ForcedCombination,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a project with a single empty set
    #[command(name = "init")]
    Init,

    /// Register a layer from a directory; every file stem becomes a trait
    #[command(name = "import-layer")]
    ImportLayer {
        /// Directory of trait files
        dir: PathBuf,

        /// Layer name (defaults to the directory name)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Print the active set's layers, weights and rules
    #[command(name = "show")]
    Show,

    /// List sets in display order
    #[command(name = "sets")]
    Sets,

    /// Add a new set
    #[command(name = "add-set")]
    AddSet,

    /// Duplicate a set by number
    #[command(name = "duplicate-set")]
    DuplicateSet { number: u32 },

    /// Delete a set by number
    #[command(name = "delete-set")]
    DeleteSet { number: u32 },

    /// Make a set the active one
    #[command(name = "select-set")]
    SelectSet { set_id: String },

    /// Toggle a layer in the active set
    #[command(name = "toggle-layer")]
    ToggleLayer { layer: String },

    /// Toggle a trait in the active set
    #[command(name = "toggle-trait")]
    ToggleTrait { layer: String, trait_name: String },

    /// Set one trait's weight in the active set
    #[command(name = "weight")]
    Weight {
        layer: String,
        trait_name: String,
        value: f64,
    },

    /// Split a layer's weight evenly over its weighted traits
    #[command(name = "equalize")]
    Equalize { layer: String },

    /// Random split of a layer's weight
    #[command(name = "randomize")]
    Randomize {
        layer: String,

        /// Seed for a reproducible split
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Equal share for every enabled trait of a layer
    #[command(name = "reset")]
    Reset { layer: String },

    /// Move a layer within the active set's order
    #[command(name = "move-layer")]
    MoveLayer { from: usize, to: usize },

    /// Forbid two traits from appearing together
    #[command(name = "incompatible")]
    Incompatible {
        layer_a: String,
        trait_a: String,
        layer_b: String,
        trait_b: String,
    },

    /// Require two traits to appear together
    #[command(name = "force")]
    Force {
        layer_a: String,
        trait_a: String,
        layer_b: String,
        trait_b: String,
    },

    /// Remove a rule between two traits
    #[command(name = "remove-rule")]
    RemoveRule {
        #[arg(value_enum)]
        kind: RuleKind,
        layer_a: String,
        trait_a: String,
        layer_b: String,
        trait_b: String,
    },

    /// Pin a layer to one trait in the active set, or clear the pin
    #[command(name = "override")]
    Override {
        layer: String,

        /// Trait to pin; omit to clear
        trait_name: Option<String>,
    },

    /// Recompute and print the active set's combination count
    #[command(name = "combinations")]
    Combinations,
}
