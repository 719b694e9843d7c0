use quarry_types::{PrimaryKey, Row, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An in-memory record of a registered entity type.
///
/// `key` is `None` until the storage backend has generated one on first
/// insert. `values` holds every non-key column the caller has set; foreign
/// key columns hold raw key values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<PrimaryKey>,
    pub values: Row,
}

impl Entity {
    /// Creates an empty, not-yet-persisted entity of the given type.
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            key: None,
            values: Row::new(),
        }
    }

    /// Creates an entity that already carries a backend key.
    pub fn with_key(entity_type: impl Into<String>, key: PrimaryKey, values: Row) -> Self {
        Self {
            entity_type: entity_type.into(),
            key: Some(key),
            values,
        }
    }

    /// Builder-style column assignment.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(column.into(), value.into());
        self
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(column.into(), value.into());
    }

    /// Returns a column value, or `None` if it was never set.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.values.get(column).and_then(Value::as_str)
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.values.get(column).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, column: &str) -> Option<f64> {
        self.values.get(column).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, column: &str) -> Option<bool> {
        self.values.get(column).and_then(Value::as_bool)
    }

    /// Whether the backend has assigned a key.
    pub const fn is_persisted(&self) -> bool {
        self.key.is_some()
    }
}

/// Renders as `<User(id=1, email='a@b.c', username='brian')>`.
impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}(id=", self.entity_type)?;
        match self.key {
            Some(key) => write!(f, "{key}")?,
            None => f.write_str("None")?,
        }
        for (column, value) in &self.values {
            write!(f, ", {column}={value}")?;
        }
        f.write_str(")>")
    }
}
