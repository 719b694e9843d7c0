//! Shared fixtures for session tests.

#![allow(dead_code)]

use quarry_model::{CascadePolicy, ColumnDef, Entity, EntitySchema, RelationshipDescriptor, SchemaRegistry};
use quarry_session::{SessionConfig, SessionFactory};
use quarry_storage::{MemoryEngine, SqliteEngine, StatementKind};
use std::sync::Arc;

/// Registers:
/// - `User(id, username UNIQUE NOT NULL, email)` owning `addresses` (delete-orphan)
/// - `Address(id, email_address NOT NULL, user_id -> User)`
/// - `Team(id, name)` owning `members` (no cascade)
/// - `Member(id, name, team_id -> Team)`
/// - `Node(id, label, parent_id -> Node)` owning `children` (delete-orphan)
pub fn registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    registry
        .register(
            EntitySchema::new("User", "users")
                .column(ColumnDef::primary_key("id"))
                .column(ColumnDef::text("username").not_null().unique())
                .column(ColumnDef::text("email"))
                .relationship(RelationshipDescriptor::one_to_many("addresses", "Address", "user_id").delete_orphan()),
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
    registry
        .register(
            EntitySchema::new("Team", "teams")
                .column(ColumnDef::primary_key("id"))
                .column(ColumnDef::text("name"))
                .relationship(
                    RelationshipDescriptor::one_to_many("members", "Member", "team_id").cascade(CascadePolicy::None),
                ),
        )
        .unwrap();
    registry
        .register(
            EntitySchema::new("Member", "members")
                .column(ColumnDef::primary_key("id"))
                .column(ColumnDef::text("name"))
                .column(ColumnDef::foreign_key("team_id", "Team", "id")),
        )
        .unwrap();
    registry
        .register(
            EntitySchema::new("Node", "nodes")
                .column(ColumnDef::primary_key("id"))
                .column(ColumnDef::text("label"))
                .column(ColumnDef::foreign_key("parent_id", "Node", "id"))
                .relationship(RelationshipDescriptor::one_to_many("children", "Node", "parent_id").delete_orphan()),
        )
        .unwrap();
    registry
}

pub fn memory() -> (MemoryEngine, SessionFactory) {
    memory_with(SessionConfig::default())
}

pub fn memory_with(config: SessionConfig) -> (MemoryEngine, SessionFactory) {
    let engine = MemoryEngine::new();
    let factory = SessionFactory::new(registry(), Arc::new(engine.clone()), config).unwrap();
    (engine, factory)
}

pub fn sqlite() -> SessionFactory {
    let engine = SqliteEngine::open_in_memory().unwrap();
    SessionFactory::new(registry(), Arc::new(engine), SessionConfig::default()).unwrap()
}

pub fn user(username: &str, email: &str) -> Entity {
    Entity::new("User").with("username", username).with("email", email)
}

pub fn address(email: &str) -> Entity {
    Entity::new("Address").with("email_address", email)
}

pub fn node(label: &str) -> Entity {
    Entity::new("Node").with("label", label)
}

/// Tables of the insert statements the engine saw, in order.
pub fn inserted_tables(engine: &MemoryEngine) -> Vec<String> {
    statements_of(engine, StatementKind::Insert)
}

pub fn statements_of(engine: &MemoryEngine, kind: StatementKind) -> Vec<String> {
    engine
        .statements()
        .into_iter()
        .filter(|s| s.kind == kind)
        .map(|s| s.table)
        .collect()
}
