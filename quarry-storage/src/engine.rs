//! The storage collaborator contract.
//!
//! An engine owns a database and hands out connections; the session layer
//! drives one connection per session. Engines enforce their own constraints
//! and concurrency control and report violations as [`StorageError`]s.

use crate::{Filter, StorageResult};
use quarry_model::TableDefinition;
use quarry_types::{PrimaryKey, Row};

/// A database the session factory can create tables in and connect to.
pub trait StorageEngine: Send + Sync {
    /// Creates every table that does not exist yet.
    fn create_schema(&self, tables: &[TableDefinition]) -> StorageResult<()>;

    /// Opens a new connection.
    fn connect(&self) -> StorageResult<Box<dyn StorageConnection>>;
}

/// A single connection. Statements outside a transaction autocommit.
pub trait StorageConnection: Send {
    fn begin(&mut self) -> StorageResult<()>;
    fn commit(&mut self) -> StorageResult<()>;
    fn rollback(&mut self) -> StorageResult<()>;

    /// Opens a named savepoint inside the current transaction.
    fn savepoint(&mut self, name: &str) -> StorageResult<()>;
    /// Releases a savepoint, keeping its changes in the transaction.
    fn release(&mut self, name: &str) -> StorageResult<()>;
    /// Undoes everything since the savepoint; the savepoint stays open.
    fn rollback_to(&mut self, name: &str) -> StorageResult<()>;

    fn in_transaction(&self) -> bool;

    /// Inserts a row and returns the generated primary key. `values` must
    /// not contain the key column.
    fn execute_insert(&mut self, table: &TableDefinition, values: &Row) -> StorageResult<PrimaryKey>;

    /// Updates the given columns of the row identified by `key`.
    fn execute_update(&mut self, table: &TableDefinition, key: PrimaryKey, values: &Row) -> StorageResult<()>;

    fn execute_delete(&mut self, table: &TableDefinition, key: PrimaryKey) -> StorageResult<()>;

    /// Returns matching rows, including the key column, in key order.
    fn execute_select(&mut self, table: &TableDefinition, filter: &Filter) -> StorageResult<Vec<Row>>;
}
