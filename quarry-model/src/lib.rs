//! Entity model and schema registry for Quarry.
//!
//! Defines the types every layer above storage depends on:
//! - [`Entity`] - an in-memory record (type, optional key, column values)
//! - [`EntitySchema`] / [`ColumnDef`] - an entity type's table shape
//! - [`RelationshipDescriptor`] - a one-to-many link with its cascade policy
//! - [`SchemaRegistry`] - validated, freezable registry of entity types
//! - [`TableDefinition`] - the storage-facing view of a registered schema
//!
//! Schemas are registered explicitly at startup; nothing is attached
//! implicitly by type declarations.

mod entity;
mod error;
mod registry;
mod relationship;
mod schema;
mod table;

pub use entity::Entity;
pub use error::{ModelError, ModelResult};
pub use registry::SchemaRegistry;
pub use relationship::{CascadePolicy, Cardinality, RelationshipDescriptor};
pub use schema::{ColumnDef, EntitySchema, ForeignKey};
pub use table::{TableColumn, TableDefinition};
