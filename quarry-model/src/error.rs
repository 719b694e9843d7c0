//! Error types for schema registration and entity validation.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised by the schema registry.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Invalid schema declaration. Programmer error, fatal at setup.
    #[error("schema error: {0}")]
    Schema(String),

    /// The entity type was never registered.
    #[error("unknown entity type: {0}")]
    UnknownEntity(String),

    /// A type was re-registered with a different shape, or a table name clashes.
    #[error("conflicting registration: {0}")]
    Conflict(String),

    /// An entity does not match its registered schema.
    #[error("invalid {entity_type}: {reason}")]
    InvalidEntity { entity_type: String, reason: String },
}

impl ModelError {
    pub(crate) fn invalid(entity_type: &str, reason: impl Into<String>) -> Self {
        Self::InvalidEntity {
            entity_type: entity_type.to_string(),
            reason: reason.into(),
        }
    }
}
