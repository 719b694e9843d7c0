//! Core type definitions for Quarry.
//!
//! This crate defines the fundamental, schema-agnostic types used throughout
//! the persistence layer:
//! - Scalar [`Value`]s, their [`ColumnType`]s and [`Row`]s
//! - Backend-generated [`PrimaryKey`]s and session-local [`InstanceId`]s
//! - Primitive [`WriteOperation`]s dispatched to a storage backend
//!
//! Everything that knows about entity types, tables or relationships lives in
//! `quarry-model` and above.

mod ids;
mod operation;
mod value;

pub use ids::{InstanceId, PrimaryKey};
pub use operation::{WriteKind, WriteOperation};
pub use value::{ColumnType, Row, Value};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("value {value} is not compatible with column type {expected}")]
    TypeMismatch { expected: ColumnType, value: String },
}
