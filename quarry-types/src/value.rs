//! Scalar values stored in entity columns.

use crate::PrimaryKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A row as exchanged with a storage backend: column name to value.
pub type Row = BTreeMap<String, Value>;

/// The semantic type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Bool,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Integer => "integer",
            Self::Real => "real",
            Self::Text => "text",
            Self::Bool => "bool",
        };
        f.write_str(name)
    }
}

/// A single scalar value.
///
/// Serialized untagged so rows print as plain JSON objects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Bool(bool),
}

impl Value {
    /// Returns the column type this value naturally belongs to, or `None` for `Null`.
    #[must_use]
    pub const fn column_type(&self) -> Option<ColumnType> {
        match self {
            Self::Null => None,
            Self::Integer(_) => Some(ColumnType::Integer),
            Self::Real(_) => Some(ColumnType::Real),
            Self::Text(_) => Some(ColumnType::Text),
            Self::Bool(_) => Some(ColumnType::Bool),
        }
    }

    /// Whether this value may be stored in a column of `column_type`.
    ///
    /// `Null` is reported compatible; nullability is a column concern.
    /// Integers widen into real columns.
    #[must_use]
    pub const fn is_compatible_with(&self, column_type: ColumnType) -> bool {
        matches!(
            (self, column_type),
            (Self::Null, _)
                | (Self::Integer(_), ColumnType::Integer | ColumnType::Real)
                | (Self::Real(_), ColumnType::Real)
                | (Self::Text(_), ColumnType::Text)
                | (Self::Bool(_), ColumnType::Bool)
        )
    }

    /// Checks compatibility, returning a descriptive error on mismatch.
    pub fn check_type(&self, column_type: ColumnType) -> crate::Result<()> {
        if self.is_compatible_with(column_type) {
            Ok(())
        } else {
            Err(crate::Error::TypeMismatch {
                expected: column_type,
                value: self.to_string(),
            })
        }
    }

    /// The value as stored in a column of `column_type`: integers written to
    /// real columns become reals, everything else is unchanged.
    #[must_use]
    pub fn coerce_to(self, column_type: ColumnType) -> Self {
        match (self, column_type) {
            #[allow(clippy::cast_precision_loss)]
            (Self::Integer(v), ColumnType::Real) => Self::Real(v as f64),
            (value, _) => value,
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Real(v) => Some(*v),
            #[allow(clippy::cast_precision_loss)]
            Self::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Interprets this value as a primary key reference.
    #[must_use]
    pub const fn as_key(&self) -> Option<PrimaryKey> {
        match self {
            Self::Integer(v) => Some(PrimaryKey::new(*v)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Real(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "'{v}'"),
            Self::Bool(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<PrimaryKey> for Value {
    fn from(key: PrimaryKey) -> Self {
        Self::Integer(key.get())
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}
