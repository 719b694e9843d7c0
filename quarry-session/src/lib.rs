//! Unit-of-work sessions for Quarry.
//!
//! This crate turns in-memory entity edits into ordered storage writes:
//!
//! - [`SessionFactory`] - freezes the schema registry, creates tables and
//!   opens sessions
//! - [`Session`] - tracks pending, dirty and deleted instances; flush,
//!   commit, rollback; queries and lazy loading of related collections
//! - [`IdentityMap`] - one live instance per persisted row within a session
//! - relationship binding - both ends of a one-to-many link stay consistent,
//!   with re-parenting, delete-orphan and cascade delete
//! - [`topological_order`] - dependency-safe ordering of inserts and deletes
//! - [`translate`] - caller predicates to backend [`Filter`](quarry_storage::Filter)s
//!
//! # Example
//!
//! ```
//! use quarry_model::{ColumnDef, Entity, EntitySchema, SchemaRegistry};
//! use quarry_session::{field, SessionConfig, SessionFactory};
//! use quarry_storage::MemoryEngine;
//! use std::sync::Arc;
//!
//! let mut registry = SchemaRegistry::new();
//! registry
//!     .register(
//!         EntitySchema::new("User", "users")
//!             .column(ColumnDef::primary_key("id"))
//!             .column(ColumnDef::text("username").not_null()),
//!     )
//!     .unwrap();
//!
//! let factory = SessionFactory::new(registry, Arc::new(MemoryEngine::new()), SessionConfig::default()).unwrap();
//! let mut session = factory.open().unwrap();
//! let ed = session.add(Entity::new("User").with("username", "ed")).unwrap();
//! session.commit().unwrap();
//!
//! let found = session.query("User").filter(field("username").eq("ed")).first().unwrap();
//! assert_eq!(found, Some(ed));
//! ```

mod binder;
mod config;
mod error;
mod factory;
mod identity_map;
mod planner;
mod query;
mod session;
mod state;

pub use config::SessionConfig;
pub use error::{SessionError, SessionResult};
pub use factory::SessionFactory;
pub use identity_map::IdentityMap;
pub use planner::{topological_order, FlushPlan, PlanNode};
pub use query::{field, translate, Field, Predicate, Query};
pub use session::{FlushSummary, Session};
pub use state::InstanceState;
