//! Error types for the session layer.

use quarry_model::ModelError;
use quarry_storage::StorageError;
use quarry_types::{InstanceId, PrimaryKey, WriteOperation};
use thiserror::Error;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors that can occur while tracking, flushing or querying.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Schema, unknown-entity and conflicting-registration errors, plus
    /// entities that fail validation.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// A different instance is already mapped under this identity.
    #[error("identity conflict: {entity_type}#{key} is mapped to another instance")]
    IdentityConflict { entity_type: String, key: PrimaryKey },

    /// An entity with this key is already tracked by the session.
    #[error("{entity_type}#{key} is already tracked by this session")]
    AlreadyTracked { entity_type: String, key: PrimaryKey },

    /// The handle does not belong to this session, or was expunged.
    #[error("unknown instance: {0}")]
    UnknownInstance(InstanceId),

    #[error("{child} is not bound to {parent} through {relationship}")]
    NotBound {
        parent: InstanceId,
        child: InstanceId,
        relationship: String,
    },

    /// Pending inserts or deletes cannot be ordered.
    #[error("cyclic dependency among instances: {}", join(instances))]
    CyclicDependency { instances: Vec<InstanceId> },

    #[error("unsupported predicate: {0}")]
    UnsupportedPredicate(String),

    #[error("type mismatch for {entity_type}.{column}: {source}")]
    TypeMismatch {
        entity_type: String,
        column: String,
        #[source]
        source: quarry_types::Error,
    },

    /// The operation is not allowed in the instance's current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The backend rejected a write during flush. The flush was rolled back
    /// as a unit.
    #[error("flush failed at `{operation}`: {source}")]
    Persistence {
        operation: Box<WriteOperation>,
        #[source]
        source: StorageError,
    },

    /// Backend failure outside a flush (select, begin, commit).
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl SessionError {
    /// True if the backend reported a write conflict with another connection.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::Storage(StorageError::Conflict(_))
                | Self::Persistence {
                    source: StorageError::Conflict(_),
                    ..
                }
        )
    }

    /// True if the backend rejected a write on a constraint.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Self::Persistence {
                source: StorageError::ConstraintViolation(_),
                ..
            }
        )
    }
}

fn join(instances: &[InstanceId]) -> String {
    instances
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
