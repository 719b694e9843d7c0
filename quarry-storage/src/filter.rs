//! Backend-native filter form.
//!
//! A [`Filter`] is a conjunction of simple column conditions. Both engines
//! understand it directly: the memory engine evaluates it against rows, the
//! SQLite engine renders it as a parameterized `WHERE` clause.

use quarry_types::{Row, Value};

/// A single column condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Equals { column: String, value: Value },
    IsNull { column: String },
    /// Membership in a set of values. An empty set matches nothing.
    In { column: String, values: Vec<Value> },
}

impl Condition {
    /// Equality; a `Null` value becomes an is-null test.
    pub fn equals(column: impl Into<String>, value: Value) -> Self {
        let column = column.into();
        if value.is_null() {
            Self::IsNull { column }
        } else {
            Self::Equals { column, value }
        }
    }

    pub fn is_in(column: impl Into<String>, values: Vec<Value>) -> Self {
        Self::In {
            column: column.into(),
            values,
        }
    }

    pub fn column(&self) -> &str {
        match self {
            Self::Equals { column, .. } | Self::IsNull { column } | Self::In { column, .. } => column,
        }
    }

    /// Evaluates the condition against a row. Missing columns read as `Null`.
    pub fn matches(&self, row: &Row) -> bool {
        let actual = row.get(self.column()).unwrap_or(&Value::Null);
        match self {
            Self::Equals { value, .. } => !actual.is_null() && actual == value,
            Self::IsNull { .. } => actual.is_null(),
            Self::In { values, .. } => !actual.is_null() && values.contains(actual),
        }
    }
}

/// A conjunction of conditions. The empty filter matches every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    /// The filter that matches everything.
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn and(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn push(&mut self, condition: Condition) {
        self.conditions.push(condition);
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.conditions.iter().all(|c| c.matches(row))
    }
}
