//! In-process storage engine.
//!
//! Tables live behind a shared mutex. A connection outside a transaction
//! writes straight through; inside a transaction it works on a private copy
//! of the tables and publishes it on commit. Commits are optimistic: if
//! another connection committed writes since this transaction began, a
//! writing transaction fails with [`StorageError::Conflict`].

use crate::{Filter, StorageConnection, StorageEngine, StorageError, StorageResult};
use quarry_model::TableDefinition;
use quarry_types::{PrimaryKey, Row, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

type Tables = BTreeMap<String, MemoryTable>;

/// Kind of statement recorded in the engine's log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Insert,
    Update,
    Delete,
    Select,
}

/// One statement a connection sent to the engine, accepted or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedStatement {
    pub kind: StatementKind,
    pub table: String,
    /// Targeted key for updates/deletes, generated key for accepted inserts.
    pub key: Option<PrimaryKey>,
}

#[derive(Debug, Clone)]
struct MemoryTable {
    definition: TableDefinition,
    rows: BTreeMap<i64, Row>,
    next_key: i64,
}

#[derive(Debug, Default)]
struct MemoryDatabase {
    tables: Tables,
    version: u64,
    log: Vec<ExecutedStatement>,
}

/// Shared in-memory database. Cloning yields another handle to the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryEngine {
    db: Arc<Mutex<MemoryDatabase>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every statement executed so far, in order.
    pub fn statements(&self) -> Vec<ExecutedStatement> {
        lock(&self.db).log.clone()
    }

    pub fn statement_count(&self) -> usize {
        lock(&self.db).log.len()
    }

    pub fn clear_log(&self) {
        lock(&self.db).log.clear();
    }

    /// Committed rows of a table, in key order.
    pub fn rows(&self, table: &str) -> StorageResult<Vec<Row>> {
        let db = lock(&self.db);
        let table = db
            .tables
            .get(table)
            .ok_or_else(|| StorageError::UnknownTable(table.to_string()))?;
        Ok(table.rows.values().cloned().collect())
    }

    pub fn row_count(&self, table: &str) -> StorageResult<usize> {
        Ok(self.rows(table)?.len())
    }

    pub fn has_table(&self, table: &str) -> bool {
        lock(&self.db).tables.contains_key(table)
    }
}

impl StorageEngine for MemoryEngine {
    fn create_schema(&self, tables: &[TableDefinition]) -> StorageResult<()> {
        let mut db = lock(&self.db);
        for definition in tables {
            for column in &definition.columns {
                if let Some((target, _)) = &column.references {
                    let known = db.tables.contains_key(target)
                        || tables.iter().any(|t| &t.name == target);
                    if !known {
                        return Err(StorageError::UnknownTable(target.clone()));
                    }
                }
            }
        }
        for definition in tables {
            if db.tables.contains_key(&definition.name) {
                continue;
            }
            debug!("Creating in-memory table {}", definition.name);
            db.tables.insert(
                definition.name.clone(),
                MemoryTable {
                    definition: definition.clone(),
                    rows: BTreeMap::new(),
                    next_key: 1,
                },
            );
        }
        db.version += 1;
        Ok(())
    }

    fn connect(&self) -> StorageResult<Box<dyn StorageConnection>> {
        Ok(Box::new(MemoryConnection {
            db: Arc::clone(&self.db),
            txn: None,
        }))
    }
}

#[derive(Debug)]
struct Transaction {
    base_version: u64,
    tables: Tables,
    savepoints: Vec<(String, Tables)>,
    wrote: bool,
}

/// Connection to a [`MemoryEngine`].
#[derive(Debug)]
pub struct MemoryConnection {
    db: Arc<Mutex<MemoryDatabase>>,
    txn: Option<Transaction>,
}

impl MemoryConnection {
    fn record(&self, kind: StatementKind, table: &str, key: Option<PrimaryKey>) {
        lock(&self.db).log.push(ExecutedStatement {
            kind,
            table: table.to_string(),
            key,
        });
    }

    /// Runs a write against the transaction copy, or directly against the
    /// shared tables when autocommitting.
    fn write<R>(&mut self, op: impl FnOnce(&mut Tables) -> StorageResult<R>) -> StorageResult<R> {
        if let Some(txn) = self.txn.as_mut() {
            let result = op(&mut txn.tables)?;
            txn.wrote = true;
            Ok(result)
        } else {
            let mut db = lock(&self.db);
            let result = op(&mut db.tables)?;
            db.version += 1;
            Ok(result)
        }
    }

    fn read<R>(&self, op: impl FnOnce(&Tables) -> StorageResult<R>) -> StorageResult<R> {
        match self.txn.as_ref() {
            Some(txn) => op(&txn.tables),
            None => op(&lock(&self.db).tables),
        }
    }

    fn txn_mut(&mut self) -> StorageResult<&mut Transaction> {
        self.txn
            .as_mut()
            .ok_or_else(|| StorageError::Transaction("no transaction is active".to_string()))
    }
}

impl StorageConnection for MemoryConnection {
    fn begin(&mut self) -> StorageResult<()> {
        if self.txn.is_some() {
            return Err(StorageError::Transaction(
                "cannot begin: a transaction is already active".to_string(),
            ));
        }
        let db = lock(&self.db);
        self.txn = Some(Transaction {
            base_version: db.version,
            tables: db.tables.clone(),
            savepoints: Vec::new(),
            wrote: false,
        });
        Ok(())
    }

    fn commit(&mut self) -> StorageResult<()> {
        let txn = self
            .txn
            .take()
            .ok_or_else(|| StorageError::Transaction("no transaction is active".to_string()))?;
        if !txn.wrote {
            return Ok(());
        }
        let mut db = lock(&self.db);
        if db.version != txn.base_version {
            return Err(StorageError::Conflict(
                "another connection committed since this transaction began".to_string(),
            ));
        }
        db.tables = txn.tables;
        db.version += 1;
        Ok(())
    }

    fn rollback(&mut self) -> StorageResult<()> {
        self.txn
            .take()
            .map(|_| ())
            .ok_or_else(|| StorageError::Transaction("no transaction is active".to_string()))
    }

    fn savepoint(&mut self, name: &str) -> StorageResult<()> {
        let txn = self.txn_mut()?;
        let snapshot = txn.tables.clone();
        txn.savepoints.push((name.to_string(), snapshot));
        Ok(())
    }

    fn release(&mut self, name: &str) -> StorageResult<()> {
        let txn = self.txn_mut()?;
        let idx = find_savepoint(txn, name)?;
        txn.savepoints.truncate(idx);
        Ok(())
    }

    fn rollback_to(&mut self, name: &str) -> StorageResult<()> {
        let txn = self.txn_mut()?;
        let idx = find_savepoint(txn, name)?;
        txn.tables = txn.savepoints[idx].1.clone();
        txn.savepoints.truncate(idx + 1);
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.txn.is_some()
    }

    fn execute_insert(&mut self, table: &TableDefinition, values: &Row) -> StorageResult<PrimaryKey> {
        let result = self.write(|tables| insert_row(tables, &table.name, values));
        self.record(StatementKind::Insert, &table.name, result.as_ref().ok().copied());
        result
    }

    fn execute_update(&mut self, table: &TableDefinition, key: PrimaryKey, values: &Row) -> StorageResult<()> {
        self.record(StatementKind::Update, &table.name, Some(key));
        self.write(|tables| update_row(tables, &table.name, key, values))
    }

    fn execute_delete(&mut self, table: &TableDefinition, key: PrimaryKey) -> StorageResult<()> {
        self.record(StatementKind::Delete, &table.name, Some(key));
        self.write(|tables| delete_row(tables, &table.name, key))
    }

    fn execute_select(&mut self, table: &TableDefinition, filter: &Filter) -> StorageResult<Vec<Row>> {
        self.record(StatementKind::Select, &table.name, None);
        self.read(|tables| {
            let t = get_table(tables, &table.name)?;
            if let Some(c) = filter.conditions().iter().find(|c| t.definition.column(c.column()).is_none()) {
                return Err(StorageError::InvalidData(format!(
                    "table {} has no column named {}",
                    table.name,
                    c.column()
                )));
            }
            Ok(t.rows.values().filter(|row| filter.matches(row)).cloned().collect())
        })
    }
}

fn lock(db: &Mutex<MemoryDatabase>) -> MutexGuard<'_, MemoryDatabase> {
    db.lock().unwrap_or_else(PoisonError::into_inner)
}

fn find_savepoint(txn: &Transaction, name: &str) -> StorageResult<usize> {
    txn.savepoints
        .iter()
        .rposition(|(n, _)| n == name)
        .ok_or_else(|| StorageError::Transaction(format!("no such savepoint: {name}")))
}

fn get_table<'a>(tables: &'a Tables, name: &str) -> StorageResult<&'a MemoryTable> {
    tables
        .get(name)
        .ok_or_else(|| StorageError::UnknownTable(name.to_string()))
}

fn insert_row(tables: &mut Tables, name: &str, values: &Row) -> StorageResult<PrimaryKey> {
    let table = get_table(tables, name)?;
    let pk = table.definition.primary_key().to_string();
    if values.contains_key(&pk) {
        return Err(StorageError::InvalidData(format!(
            "{name}.{pk} is generated by the backend"
        )));
    }

    let mut row = Row::new();
    for column in table.definition.columns.iter().filter(|c| !c.primary_key) {
        let value = values.get(&column.name).cloned().unwrap_or(Value::Null);
        row.insert(column.name.clone(), value.coerce_to(column.column_type));
    }
    check_unknown_columns(table, values)?;
    check_row(tables, table, &row, None)?;

    let table = tables
        .get_mut(name)
        .ok_or_else(|| StorageError::UnknownTable(name.to_string()))?;
    let key = table.next_key;
    table.next_key += 1;
    row.insert(pk, Value::Integer(key));
    table.rows.insert(key, row);
    Ok(PrimaryKey::new(key))
}

fn update_row(tables: &mut Tables, name: &str, key: PrimaryKey, values: &Row) -> StorageResult<()> {
    let table = get_table(tables, name)?;
    let pk = table.definition.primary_key();
    if values.contains_key(pk) {
        return Err(StorageError::InvalidData(format!("{name}.{pk} is immutable")));
    }
    check_unknown_columns(table, values)?;
    let mut row = table
        .rows
        .get(&key.get())
        .cloned()
        .ok_or_else(|| StorageError::NotFound(format!("{name}#{key}")))?;
    for (column, value) in values {
        let value = match table.definition.column(column) {
            Some(def) => value.clone().coerce_to(def.column_type),
            None => value.clone(),
        };
        row.insert(column.clone(), value);
    }
    check_row(tables, table, &row, Some(key))?;

    if let Some(table) = tables.get_mut(name) {
        table.rows.insert(key.get(), row);
    }
    Ok(())
}

fn delete_row(tables: &mut Tables, name: &str, key: PrimaryKey) -> StorageResult<()> {
    let table = get_table(tables, name)?;
    if !table.rows.contains_key(&key.get()) {
        return Err(StorageError::NotFound(format!("{name}#{key}")));
    }
    let pk = table.definition.primary_key();

    for other in tables.values() {
        for column in &other.definition.columns {
            let Some((target_table, target_column)) = &column.references else {
                continue;
            };
            if target_table != name || target_column != pk {
                continue;
            }
            let referenced = other.rows.iter().any(|(row_key, row)| {
                let same_row = other.definition.name == name && *row_key == key.get();
                !same_row && row.get(&column.name) == Some(&Value::Integer(key.get()))
            });
            if referenced {
                return Err(StorageError::ConstraintViolation(format!(
                    "FOREIGN KEY constraint failed: {}.{} still references {name}#{key}",
                    other.definition.name, column.name
                )));
            }
        }
    }

    if let Some(table) = tables.get_mut(name) {
        table.rows.remove(&key.get());
    }
    Ok(())
}

fn check_unknown_columns(table: &MemoryTable, values: &Row) -> StorageResult<()> {
    match values.keys().find(|c| table.definition.column(c).is_none()) {
        Some(column) => Err(StorageError::InvalidData(format!(
            "table {} has no column named {column}",
            table.definition.name
        ))),
        None => Ok(()),
    }
}

/// Checks NOT NULL, types, UNIQUE and FOREIGN KEY constraints for a full row.
/// `existing` is the row's own key when updating.
fn check_row(tables: &Tables, table: &MemoryTable, row: &Row, existing: Option<PrimaryKey>) -> StorageResult<()> {
    let name = &table.definition.name;
    for column in table.definition.columns.iter().filter(|c| !c.primary_key) {
        let value = row.get(&column.name).unwrap_or(&Value::Null);
        if value.is_null() {
            if !column.nullable {
                return Err(StorageError::ConstraintViolation(format!(
                    "NOT NULL constraint failed: {name}.{}",
                    column.name
                )));
            }
            continue;
        }
        if !value.is_compatible_with(column.column_type) {
            return Err(StorageError::InvalidData(format!(
                "{name}.{} expects {}, got {value}",
                column.name, column.column_type
            )));
        }
        if column.unique {
            let duplicate = table.rows.iter().any(|(row_key, other)| {
                Some(PrimaryKey::new(*row_key)) != existing && other.get(&column.name) == Some(value)
            });
            if duplicate {
                return Err(StorageError::ConstraintViolation(format!(
                    "UNIQUE constraint failed: {name}.{}",
                    column.name
                )));
            }
        }
        if let Some((target, _)) = &column.references {
            let target_key = value.as_i64().unwrap_or_default();
            let exists = if target == name {
                table.rows.contains_key(&target_key) || existing.map(|k| k.get()) == Some(target_key)
            } else {
                get_table(tables, target)?.rows.contains_key(&target_key)
            };
            if !exists {
                return Err(StorageError::ConstraintViolation(format!(
                    "FOREIGN KEY constraint failed: {name}.{} references missing {target}#{target_key}",
                    column.name
                )));
            }
        }
    }
    Ok(())
}
