//! Storage collaborators for Quarry.
//!
//! The session layer talks to storage only through [`StorageEngine`] and
//! [`StorageConnection`]. Two engines ship with the crate:
//!
//! - [`MemoryEngine`] - in-process tables with NOT NULL / UNIQUE / FOREIGN
//!   KEY enforcement, savepoints, optimistic conflict detection between
//!   connections and a statement log for tests
//! - [`SqliteEngine`] - SQLite via `rusqlite`, on disk or in a shared
//!   in-memory database
//!
//! # Architecture
//!
//! - One row per entity instance, keyed by a backend-generated integer
//! - Filters are conjunctions of equality / IN conditions ([`Filter`])
//! - Every flush runs inside a savepoint so a rejected write undoes the batch

mod engine;
mod error;
mod filter;
mod memory;
mod sqlite;

pub use engine::{StorageConnection, StorageEngine};
pub use error::{StorageError, StorageResult};
pub use filter::{Condition, Filter};
pub use memory::{ExecutedStatement, MemoryConnection, MemoryEngine, StatementKind};
pub use sqlite::{SqliteConnection, SqliteEngine};
