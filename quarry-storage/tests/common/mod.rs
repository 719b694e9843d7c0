//! Shared table fixtures for storage tests.

#![allow(dead_code)]

use quarry_model::{ColumnDef, EntitySchema, RelationshipDescriptor, SchemaRegistry, TableDefinition};
use quarry_types::{Row, Value};

/// `users(id, username UNIQUE NOT NULL, email)` and
/// `addresses(id, email_address NOT NULL, user_id -> users.id)`.
pub fn tables() -> Vec<TableDefinition> {
    let mut registry = SchemaRegistry::new();
    registry
        .register(
            EntitySchema::new("User", "users")
                .column(ColumnDef::primary_key("id"))
                .column(ColumnDef::text("username").not_null().unique())
                .column(ColumnDef::text("email"))
                .relationship(RelationshipDescriptor::one_to_many("addresses", "Address", "user_id")),
        )
        .unwrap();
    registry
        .register(
            EntitySchema::new("Address", "addresses")
                .column(ColumnDef::primary_key("id"))
                .column(ColumnDef::text("email_address").not_null())
                .column(ColumnDef::foreign_key("user_id", "User", "id")),
        )
        .unwrap();
    registry.freeze().unwrap();
    registry.table_definitions()
}

pub fn users() -> TableDefinition {
    tables().remove(0)
}

pub fn addresses() -> TableDefinition {
    tables().remove(1)
}

pub fn row(values: &[(&str, Value)]) -> Row {
    values.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
}

pub fn user(username: &str, email: &str) -> Row {
    row(&[("username", username.into()), ("email", email.into())])
}

pub fn address(email: &str, user_id: i64) -> Row {
    row(&[("email_address", email.into()), ("user_id", Value::Integer(user_id))])
}
