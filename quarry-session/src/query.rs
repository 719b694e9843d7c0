//! Caller predicates and their translation into backend filters.
//!
//! Predicates are built with [`field`]:
//!
//! ```
//! use quarry_session::field;
//!
//! let by_name = field("username").eq("ed");
//! let some = field("username").is_in(["ed", "wendy"]);
//! let both = by_name.and(some);
//! ```
//!
//! Only conjunctions of equality and membership tests can be translated;
//! everything else is rejected with
//! [`SessionError::UnsupportedPredicate`](crate::SessionError::UnsupportedPredicate).

use crate::{Session, SessionError, SessionResult};
use quarry_model::EntitySchema;
use quarry_storage::{Condition, Filter};
use quarry_types::{InstanceId, Value};
use std::fmt;

/// A comparison over entity fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(String, Value),
    In(String, Vec<Value>),
    NotEq(String, Value),
    Lt(String, Value),
    Gt(String, Value),
    Like(String, String),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    #[must_use]
    pub fn and(self, other: Predicate) -> Predicate {
        match self {
            Predicate::And(mut parts) => {
                parts.push(other);
                Predicate::And(parts)
            }
            first => Predicate::And(vec![first, other]),
        }
    }

    #[must_use]
    pub fn or(self, other: Predicate) -> Predicate {
        Predicate::Or(vec![self, other])
    }

    #[must_use]
    pub fn not(self) -> Predicate {
        Predicate::Not(Box::new(self))
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Eq(c, v) => write!(f, "{c} = {v}"),
            Predicate::In(c, vs) => {
                let items: Vec<String> = vs.iter().map(ToString::to_string).collect();
                write!(f, "{c} IN ({})", items.join(", "))
            }
            Predicate::NotEq(c, v) => write!(f, "{c} != {v}"),
            Predicate::Lt(c, v) => write!(f, "{c} < {v}"),
            Predicate::Gt(c, v) => write!(f, "{c} > {v}"),
            Predicate::Like(c, p) => write!(f, "{c} LIKE '{p}'"),
            Predicate::And(ps) => write_joined(f, ps, " AND "),
            Predicate::Or(ps) => write_joined(f, ps, " OR "),
            Predicate::Not(p) => write!(f, "NOT ({p})"),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, parts: &[Predicate], sep: &str) -> fmt::Result {
    let parts: Vec<String> = parts.iter().map(|p| format!("({p})")).collect();
    f.write_str(&parts.join(sep))
}

/// Starts a predicate on the named field.
pub fn field(name: impl Into<String>) -> Field {
    Field(name.into())
}

/// A field name awaiting a comparison.
#[derive(Debug, Clone)]
pub struct Field(String);

impl Field {
    pub fn eq(self, value: impl Into<Value>) -> Predicate {
        Predicate::Eq(self.0, value.into())
    }

    pub fn ne(self, value: impl Into<Value>) -> Predicate {
        Predicate::NotEq(self.0, value.into())
    }

    pub fn lt(self, value: impl Into<Value>) -> Predicate {
        Predicate::Lt(self.0, value.into())
    }

    pub fn gt(self, value: impl Into<Value>) -> Predicate {
        Predicate::Gt(self.0, value.into())
    }

    pub fn like(self, pattern: impl Into<String>) -> Predicate {
        Predicate::Like(self.0, pattern.into())
    }

    /// Membership in a set of values (SQL `IN`).
    pub fn is_in<I, V>(self, values: I) -> Predicate
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Predicate::In(self.0, values.into_iter().map(Into::into).collect())
    }

    pub fn is_null(self) -> Predicate {
        Predicate::Eq(self.0, Value::Null)
    }
}

/// Translates a conjunction of predicates over `schema` into a [`Filter`].
pub fn translate(schema: &EntitySchema, predicates: &[Predicate]) -> SessionResult<Filter> {
    let mut filter = Filter::all();
    for predicate in predicates {
        translate_into(schema, predicate, &mut filter)?;
    }
    Ok(filter)
}

fn translate_into(schema: &EntitySchema, predicate: &Predicate, filter: &mut Filter) -> SessionResult<()> {
    match predicate {
        Predicate::Eq(column, value) => {
            let value = check_value(schema, column, value)?;
            filter.push(Condition::equals(column.as_str(), value));
        }
        Predicate::In(column, values) => {
            let values = values
                .iter()
                .map(|v| check_value(schema, column, v))
                .collect::<SessionResult<Vec<_>>>()?;
            filter.push(Condition::is_in(column.as_str(), values));
        }
        Predicate::And(parts) => {
            for part in parts {
                translate_into(schema, part, filter)?;
            }
        }
        other => {
            return Err(SessionError::UnsupportedPredicate(format!(
                "{other}: only equality and IN conjunctions are supported"
            )));
        }
    }
    Ok(())
}

/// Checks `value` against the column type; integers compared with real
/// columns are widened so both backends see the stored representation.
fn check_value(schema: &EntitySchema, column: &str, value: &Value) -> SessionResult<Value> {
    let def = schema.find_column(column).ok_or_else(|| {
        SessionError::UnsupportedPredicate(format!("{} has no column named {column}", schema.entity_type))
    })?;
    value
        .check_type(def.column_type)
        .map_err(|source| SessionError::TypeMismatch {
            entity_type: schema.entity_type.clone(),
            column: column.to_string(),
            source,
        })?;
    Ok(value.clone().coerce_to(def.column_type))
}

/// A pending query over one entity type. Filters combine by conjunction.
#[must_use = "a query does nothing until `all` or `first` is called"]
pub struct Query<'s> {
    session: &'s mut Session,
    entity_type: String,
    predicates: Vec<Predicate>,
}

impl<'s> Query<'s> {
    pub(crate) fn new(session: &'s mut Session, entity_type: &str) -> Self {
        Self {
            session,
            entity_type: entity_type.to_string(),
            predicates: Vec::new(),
        }
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Every matching instance, in primary-key order.
    pub fn all(self) -> SessionResult<Vec<InstanceId>> {
        self.session.select(&self.entity_type, &self.predicates)
    }

    pub fn first(self) -> SessionResult<Option<InstanceId>> {
        Ok(self.all()?.into_iter().next())
    }
}
