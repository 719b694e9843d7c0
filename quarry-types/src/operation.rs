//! Primitive write operations.
//!
//! A flush is translated into a sequence of these operations. They carry
//! everything a backend needs to apply the change and are reported back to
//! callers when the backend rejects one.

use crate::{PrimaryKey, Row};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of a write operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteKind {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for WriteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// A single primitive write against one table row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WriteOperation {
    /// Insert a new row; the backend generates the key.
    Insert {
        entity_type: String,
        table: String,
        values: Row,
    },

    /// Update the given columns of an existing row.
    Update {
        entity_type: String,
        table: String,
        key: PrimaryKey,
        values: Row,
    },

    /// Delete an existing row.
    Delete {
        entity_type: String,
        table: String,
        key: PrimaryKey,
    },
}

impl WriteOperation {
    #[must_use]
    pub const fn kind(&self) -> WriteKind {
        match self {
            Self::Insert { .. } => WriteKind::Insert,
            Self::Update { .. } => WriteKind::Update,
            Self::Delete { .. } => WriteKind::Delete,
        }
    }

    #[must_use]
    pub fn entity_type(&self) -> &str {
        match self {
            Self::Insert { entity_type, .. }
            | Self::Update { entity_type, .. }
            | Self::Delete { entity_type, .. } => entity_type,
        }
    }

    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::Insert { table, .. } | Self::Update { table, .. } | Self::Delete { table, .. } => {
                table
            }
        }
    }

    /// The targeted key; `None` for inserts.
    #[must_use]
    pub const fn key(&self) -> Option<PrimaryKey> {
        match self {
            Self::Insert { .. } => None,
            Self::Update { key, .. } | Self::Delete { key, .. } => Some(*key),
        }
    }

    /// Column values written by this operation; empty for deletes.
    #[must_use]
    pub fn values(&self) -> Option<&Row> {
        match self {
            Self::Insert { values, .. } | Self::Update { values, .. } => Some(values),
            Self::Delete { .. } => None,
        }
    }
}

impl fmt::Display for WriteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert { entity_type, table, values } => {
                write!(f, "insert {entity_type} into {table} (")?;
                for (i, (column, value)) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{column}={value}")?;
                }
                f.write_str(")")
            }
            Self::Update { entity_type, table, key, values } => {
                write!(f, "update {entity_type} {table}#{key} set (")?;
                for (i, (column, value)) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{column}={value}")?;
                }
                f.write_str(")")
            }
            Self::Delete { entity_type, table, key } => {
                write!(f, "delete {entity_type} {table}#{key}")
            }
        }
    }
}
