//! Error handling for Traitforge
//!
//! Errors fall into three categories. Validation errors reject an operation
//! before it touches state, referential errors are logged by the engine and
//! turned into no-ops, and persistence errors are logged by the scheduler
//! while the in-memory state stays authoritative.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Traitforge operations
pub type Result<T> = std::result::Result<T, ForgeError>;

/// Broad category of a [`ForgeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Referential,
    Persistence,
}

/// Main error type for Traitforge operations
#[derive(Error, Debug)]
pub enum ForgeError {
    // Validation Errors
    #[error("No active set is selected")]
    NoActiveSet,

    #[error("Trait '{trait_name}' in layer '{layer}' is not enabled for set {set_id}")]
    TraitNotEnabled {
        set_id: String,
        layer: String,
        trait_name: String,
    },

    #[error("Cannot link two traits of the same layer '{layer}'")]
    SameLayerConstraint { layer: String },

    #[error("{registry} already contains {layer_a}/{trait_a} <-> {layer_b}/{trait_b}")]
    ConstraintAlreadyExists {
        registry: &'static str,
        layer_a: String,
        trait_a: String,
        layer_b: String,
        trait_b: String,
    },

    #[error("{layer_a}/{trait_a} <-> {layer_b}/{trait_b} is already registered as {existing}")]
    ConstraintConflict {
        existing: &'static str,
        layer_a: String,
        trait_a: String,
        layer_b: String,
        trait_b: String,
    },

    #[error("Invalid weight: {value}")]
    InvalidWeight { value: f64 },

    #[error("Invalid opacity: {value} (expected 0.0 to 1.0)")]
    InvalidOpacity { value: f64 },

    #[error("Invalid layer order: {reason}")]
    InvalidLayerOrder { reason: String },

    #[error("Invalid set order: {reason}")]
    InvalidSetOrder { reason: String },

    #[error("Cannot delete {set_id}: it is the only set")]
    LastSet { set_id: String },

    #[error("Invalid settings: {reason}")]
    InvalidSettings { reason: String },

    // Referential Errors
    #[error("Set not found: {set_id}")]
    SetNotFound { set_id: String },

    #[error("Layer not found: {layer}")]
    LayerNotFound { layer: String },

    #[error("Trait not found: {layer}/{trait_name}")]
    TraitNotFound { layer: String, trait_name: String },

    #[error("Pipeline not found: {pipeline_id}")]
    PipelineNotFound { pipeline_id: String },

    // History Errors
    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("Nothing to redo")]
    NothingToRedo,

    // Persistence Errors
    #[error("Failed to read file: {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}: {source}")]
    FileWriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory creation failed: {path}: {source}")]
    DirectoryCreateError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Checksum mismatch in {path}")]
    ChecksumMismatch { path: PathBuf },

    #[error("Invalid snapshot schema version: {version}")]
    InvalidSchemaVersion { version: String },

    #[error("Migration failed from {from} to {to}: {reason}")]
    MigrationError {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Persistence backend failure: {reason}")]
    Backend { reason: String },

    #[error("JSON serialization error: {0}")]
    JsonSerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ForgeError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ForgeError::NoActiveSet
            | ForgeError::TraitNotEnabled { .. }
            | ForgeError::SameLayerConstraint { .. }
            | ForgeError::ConstraintAlreadyExists { .. }
            | ForgeError::ConstraintConflict { .. }
            | ForgeError::InvalidWeight { .. }
            | ForgeError::InvalidOpacity { .. }
            | ForgeError::InvalidLayerOrder { .. }
            | ForgeError::InvalidSetOrder { .. }
            | ForgeError::InvalidSettings { .. }
            | ForgeError::LastSet { .. }
            | ForgeError::NothingToUndo
            | ForgeError::NothingToRedo => ErrorKind::Validation,
            ForgeError::SetNotFound { .. }
            | ForgeError::LayerNotFound { .. }
            | ForgeError::TraitNotFound { .. }
            | ForgeError::PipelineNotFound { .. } => ErrorKind::Referential,
            _ => ErrorKind::Persistence,
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            ForgeError::NoActiveSet => "NO_ACTIVE_SET",
            ForgeError::TraitNotEnabled { .. } => "TRAIT_NOT_ENABLED",
            ForgeError::SameLayerConstraint { .. } => "SAME_LAYER_CONSTRAINT",
            ForgeError::ConstraintAlreadyExists { .. } => "CONSTRAINT_ALREADY_EXISTS",
            ForgeError::ConstraintConflict { .. } => "CONSTRAINT_CONFLICT",
            ForgeError::InvalidWeight { .. } => "INVALID_WEIGHT",
            ForgeError::InvalidOpacity { .. } => "INVALID_OPACITY",
            ForgeError::InvalidLayerOrder { .. } => "INVALID_LAYER_ORDER",
            ForgeError::InvalidSetOrder { .. } => "INVALID_SET_ORDER",
            ForgeError::InvalidSettings { .. } => "INVALID_SETTINGS",
            ForgeError::LastSet { .. } => "LAST_SET",
            ForgeError::SetNotFound { .. } => "SET_NOT_FOUND",
            ForgeError::LayerNotFound { .. } => "LAYER_NOT_FOUND",
            ForgeError::TraitNotFound { .. } => "TRAIT_NOT_FOUND",
            ForgeError::PipelineNotFound { .. } => "PIPELINE_NOT_FOUND",
            ForgeError::NothingToUndo => "NOTHING_TO_UNDO",
            ForgeError::NothingToRedo => "NOTHING_TO_REDO",
            ForgeError::FileReadError { .. } => "FILE_READ_ERROR",
            ForgeError::FileWriteError { .. } => "FILE_WRITE_ERROR",
            ForgeError::DirectoryCreateError { .. } => "DIRECTORY_CREATE_ERROR",
            ForgeError::ChecksumMismatch { .. } => "CHECKSUM_MISMATCH",
            ForgeError::InvalidSchemaVersion { .. } => "INVALID_SCHEMA_VERSION",
            ForgeError::MigrationError { .. } => "MIGRATION_ERROR",
            ForgeError::Backend { .. } => "BACKEND_ERROR",
            ForgeError::JsonSerializationError(_) => "SERIALIZATION_ERROR",
            ForgeError::Io(_) => "IO_ERROR",
        }
    }

    /// Returns a user-friendly recovery suggestion.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            ForgeError::NoActiveSet => Some("Create or select a set first."),
            ForgeError::TraitNotEnabled { .. } => {
                Some("Enable both traits in the active set before linking them.")
            }
            ForgeError::ConstraintConflict { .. } => {
                Some("Remove the existing rule for this pair before adding the opposite one.")
            }
            ForgeError::InvalidWeight { .. } => Some("Weights must be numbers between 0 and 100."),
            ForgeError::ChecksumMismatch { .. } => {
                Some("The snapshot was edited or truncated. Restore one from the backups directory.")
            }
            ForgeError::InvalidSchemaVersion { .. } => {
                Some("The project was saved by a newer version of traitforge.")
            }
            ForgeError::NothingToUndo => Some("There are no changes to undo."),
            ForgeError::NothingToRedo => Some("There are no undone changes to redo."),
            _ => None,
        }
    }
}
