// error.rs — Error types for the trust graduation subsystem.

use std::path::PathBuf;

use thiserror::Error;

use crate::level::AutonomyLevel;

/// Errors that can occur during graduation operations.
#[derive(Debug, Error)]
pub enum GraduationError {
    /// A metrics update named a field that `CategoryMetrics` does not define.
    #[error("unknown metrics field: '{field}'")]
    UnknownField { field: String },

    /// A metrics update tried to change a field that is fixed at creation.
    #[error("metrics field '{field}' cannot be updated")]
    ImmutableField { field: String },

    /// A metrics update carried a value of the wrong shape for its field.
    #[error("invalid value for metrics field '{field}': {reason}")]
    InvalidFieldValue { field: String, reason: String },

    /// A string did not name one of the three autonomy levels.
    #[error("invalid autonomy level: '{level}'")]
    InvalidLevel { level: String },

    /// A transition was requested for a category the store does not know.
    #[error("category not found: '{category}'")]
    CategoryNotFound { category: String },

    /// The category name cannot be used as a store key.
    #[error("invalid category name: '{category}'")]
    InvalidCategory { category: String },

    /// The stored level changed between read and write.
    #[error("conflicting update for '{category}': expected level {expected}, found {actual}")]
    Conflict {
        category: String,
        expected: AutonomyLevel,
        actual: AutonomyLevel,
    },

    /// The threshold configuration failed validation.
    #[error("invalid threshold configuration: {reason}")]
    InvalidConfig { reason: String },

    /// A threshold configuration document could not be parsed.
    /// `origin` is the file path, or `<inline>` for in-memory documents.
    #[error("failed to parse config at {origin}: {reason}")]
    ConfigParse { origin: String, reason: String },

    /// A stored record names a different category than the key it is stored under.
    #[error("record at {path} belongs to '{found}', not '{category}'")]
    CategoryMismatch {
        category: String,
        found: String,
        path: PathBuf,
    },

    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to serialize/deserialize metrics or events.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
