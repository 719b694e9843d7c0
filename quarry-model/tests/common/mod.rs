//! Shared schema fixtures for model tests.

#![allow(dead_code)]

use quarry_model::{ColumnDef, EntitySchema, RelationshipDescriptor};

/// `User(id, username, email)` owning `addresses` with delete-orphan.
pub fn user_schema() -> EntitySchema {
    EntitySchema::new("User", "users")
        .column(ColumnDef::primary_key("id"))
        .column(ColumnDef::text("username").not_null())
        .column(ColumnDef::text("email"))
        .relationship(RelationshipDescriptor::one_to_many("addresses", "Address", "user_id").delete_orphan())
}

/// `Address(id, email_address, user_id -> User.id)`.
pub fn address_schema() -> EntitySchema {
    EntitySchema::new("Address", "addresses")
        .column(ColumnDef::primary_key("id"))
        .column(ColumnDef::text("email_address").not_null())
        .column(ColumnDef::foreign_key("user_id", "User", "id"))
}
