//! SQLite storage engine backed by `rusqlite`.
//!
//! Each [`SqliteConnection`] owns its own `rusqlite::Connection`, so
//! sessions get real SQLite transaction isolation. In-memory databases use a
//! uniquely named shared-cache URI that stays alive as long as the engine.

use crate::{Condition, Filter, StorageConnection, StorageEngine, StorageError, StorageResult};
use quarry_model::{TableColumn, TableDefinition};
use quarry_types::{ColumnType, PrimaryKey, Row, Value};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

enum Location {
    File(PathBuf),
    /// Shared-cache URI plus a connection that keeps the database alive.
    Memory { uri: String, _keepalive: Mutex<Connection> },
}

/// SQLite database, on disk or in memory.
pub struct SqliteEngine {
    location: Location,
}

impl std::fmt::Debug for SqliteEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.location {
            Location::File(path) => f.debug_struct("SqliteEngine").field("path", path).finish(),
            Location::Memory { uri, .. } => f.debug_struct("SqliteEngine").field("uri", uri).finish(),
        }
    }
}

impl SqliteEngine {
    /// Opens (or creates) a database file.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        // Fail early on unusable paths instead of on the first session.
        Connection::open(&path)?;
        debug!("Opened SQLite database at {}", path.display());
        Ok(Self {
            location: Location::File(path),
        })
    }

    /// Opens a private in-memory database shared by this engine's connections.
    pub fn open_in_memory() -> StorageResult<Self> {
        let uri = format!("file:quarry-{}?mode=memory&cache=shared", uuid::Uuid::now_v7());
        let keepalive = Connection::open_with_flags(&uri, memory_flags())?;
        Ok(Self {
            location: Location::Memory {
                uri,
                _keepalive: Mutex::new(keepalive),
            },
        })
    }

    /// Opens `url`, where `:memory:` (or `sqlite::memory:`) selects an
    /// in-memory database and anything else is a file path, optionally
    /// prefixed with `sqlite://`.
    pub fn from_url(url: &str) -> StorageResult<Self> {
        match url {
            ":memory:" | "sqlite::memory:" | "sqlite://:memory:" => Self::open_in_memory(),
            other => Self::open(other.strip_prefix("sqlite://").unwrap_or(other)),
        }
    }

    fn open_connection(&self) -> StorageResult<Connection> {
        let conn = match &self.location {
            Location::File(path) => Connection::open(path)?,
            Location::Memory { uri, .. } => Connection::open_with_flags(uri, memory_flags())?,
        };
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }
}

fn memory_flags() -> OpenFlags {
    OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_URI
}

impl StorageEngine for SqliteEngine {
    fn create_schema(&self, tables: &[TableDefinition]) -> StorageResult<()> {
        let conn = self.open_connection()?;
        let ddl: Vec<String> = tables.iter().map(create_table_sql).collect();
        for statement in &ddl {
            debug!("{statement}");
        }
        conn.execute_batch(&ddl.join(";\n"))?;
        Ok(())
    }

    fn connect(&self) -> StorageResult<Box<dyn StorageConnection>> {
        Ok(Box::new(SqliteConnection {
            conn: self.open_connection()?,
        }))
    }
}

/// Connection to a [`SqliteEngine`].
pub struct SqliteConnection {
    conn: Connection,
}

impl SqliteConnection {
    fn with_conn<R>(&self, op: impl FnOnce(&Connection) -> StorageResult<R>) -> StorageResult<R> {
        op(&self.conn)
    }

    fn batch(&self, sql: &str) -> StorageResult<()> {
        debug!("{sql}");
        self.with_conn(|conn| Ok(conn.execute_batch(sql)?))
    }
}

impl StorageConnection for SqliteConnection {
    fn begin(&mut self) -> StorageResult<()> {
        if self.in_transaction() {
            return Err(StorageError::Transaction(
                "cannot begin: a transaction is already active".to_string(),
            ));
        }
        self.batch("BEGIN")
    }

    fn commit(&mut self) -> StorageResult<()> {
        if !self.in_transaction() {
            return Err(StorageError::Transaction("no transaction is active".to_string()));
        }
        self.batch("COMMIT")
    }

    fn rollback(&mut self) -> StorageResult<()> {
        if !self.in_transaction() {
            return Err(StorageError::Transaction("no transaction is active".to_string()));
        }
        self.batch("ROLLBACK")
    }

    fn savepoint(&mut self, name: &str) -> StorageResult<()> {
        if !self.in_transaction() {
            return Err(StorageError::Transaction("no transaction is active".to_string()));
        }
        self.batch(&format!("SAVEPOINT {}", quote(name)))
    }

    fn release(&mut self, name: &str) -> StorageResult<()> {
        self.batch(&format!("RELEASE SAVEPOINT {}", quote(name)))
            .map_err(savepoint_error)
    }

    fn rollback_to(&mut self, name: &str) -> StorageResult<()> {
        self.batch(&format!("ROLLBACK TO SAVEPOINT {}", quote(name)))
            .map_err(savepoint_error)
    }

    fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    fn execute_insert(&mut self, table: &TableDefinition, values: &Row) -> StorageResult<PrimaryKey> {
        let pk = table.primary_key();
        if values.contains_key(pk) {
            return Err(StorageError::InvalidData(format!(
                "{}.{pk} is generated by the backend",
                table.name
            )));
        }
        check_columns(table, values)?;

        let sql = if values.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", quote(&table.name))
        } else {
            let columns: Vec<String> = values.keys().map(|c| quote(c)).collect();
            let params = vec!["?"; values.len()].join(", ");
            format!(
                "INSERT INTO {} ({}) VALUES ({params})",
                quote(&table.name),
                columns.join(", ")
            )
        };
        debug!("{sql}");
        self.with_conn(|conn| {
            conn.execute(&sql, params_from_iter(values.values().map(to_sql)))?;
            Ok(PrimaryKey::new(conn.last_insert_rowid()))
        })
    }

    fn execute_update(&mut self, table: &TableDefinition, key: PrimaryKey, values: &Row) -> StorageResult<()> {
        let pk = table.primary_key();
        if values.contains_key(pk) {
            return Err(StorageError::InvalidData(format!("{}.{pk} is immutable", table.name)));
        }
        check_columns(table, values)?;
        if values.is_empty() {
            return Ok(());
        }

        let assignments: Vec<String> = values.keys().map(|c| format!("{} = ?", quote(c))).collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            quote(&table.name),
            assignments.join(", "),
            quote(pk)
        );
        debug!("{sql}");
        let params: Vec<SqlValue> = values
            .values()
            .map(to_sql)
            .chain(std::iter::once(SqlValue::Integer(key.get())))
            .collect();
        let changed = self.with_conn(|conn| Ok(conn.execute(&sql, params_from_iter(params))?))?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("{}#{key}", table.name)));
        }
        Ok(())
    }

    fn execute_delete(&mut self, table: &TableDefinition, key: PrimaryKey) -> StorageResult<()> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?",
            quote(&table.name),
            quote(table.primary_key())
        );
        debug!("{sql}");
        let changed = self.with_conn(|conn| Ok(conn.execute(&sql, [key.get()])?))?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("{}#{key}", table.name)));
        }
        Ok(())
    }

    fn execute_select(&mut self, table: &TableDefinition, filter: &Filter) -> StorageResult<Vec<Row>> {
        for condition in filter.conditions() {
            if table.column(condition.column()).is_none() {
                return Err(StorageError::InvalidData(format!(
                    "table {} has no column named {}",
                    table.name,
                    condition.column()
                )));
            }
        }

        let columns: Vec<String> = table.columns.iter().map(|c| quote(&c.name)).collect();
        let (clause, params) = where_clause(filter);
        let sql = format!(
            "SELECT {} FROM {}{clause} ORDER BY {}",
            columns.join(", "),
            quote(&table.name),
            quote(table.primary_key())
        );
        debug!("{sql}");

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(params))?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let mut values = Row::new();
                for (idx, column) in table.columns.iter().enumerate() {
                    values.insert(column.name.clone(), from_sql(column, row.get_ref(idx)?)?);
                }
                out.push(values);
            }
            Ok(out)
        })
    }
}

fn savepoint_error(err: StorageError) -> StorageError {
    match err {
        StorageError::Database(e) => StorageError::Transaction(e.to_string()),
        other => other,
    }
}

fn check_columns(table: &TableDefinition, values: &Row) -> StorageResult<()> {
    match values.keys().find(|c| table.column(c).is_none()) {
        Some(column) => Err(StorageError::InvalidData(format!(
            "table {} has no column named {column}",
            table.name
        ))),
        None => Ok(()),
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn sql_type(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::Integer | ColumnType::Bool => "INTEGER",
        ColumnType::Real => "REAL",
        ColumnType::Text => "TEXT",
    }
}

fn create_table_sql(table: &TableDefinition) -> String {
    let columns: Vec<String> = table
        .columns
        .iter()
        .map(|c| {
            let mut sql = format!("{} {}", quote(&c.name), sql_type(c.column_type));
            if c.primary_key {
                sql.push_str(" PRIMARY KEY AUTOINCREMENT");
            } else {
                if !c.nullable {
                    sql.push_str(" NOT NULL");
                }
                if c.unique {
                    sql.push_str(" UNIQUE");
                }
            }
            if let Some((target, column)) = &c.references {
                sql.push_str(&format!(" REFERENCES {}({})", quote(target), quote(column)));
            }
            sql
        })
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote(&table.name),
        columns.join(", ")
    )
}

fn where_clause(filter: &Filter) -> (String, Vec<SqlValue>) {
    if filter.is_empty() {
        return (String::new(), Vec::new());
    }
    let mut parts = Vec::new();
    let mut params = Vec::new();
    for condition in filter.conditions() {
        match condition {
            Condition::Equals { column, value } => {
                parts.push(format!("{} = ?", quote(column)));
                params.push(to_sql(value));
            }
            Condition::IsNull { column } => parts.push(format!("{} IS NULL", quote(column))),
            Condition::In { values, .. } if values.is_empty() => parts.push("0".to_string()),
            Condition::In { column, values } => {
                let placeholders = vec!["?"; values.len()].join(", ");
                parts.push(format!("{} IN ({placeholders})", quote(column)));
                params.extend(values.iter().map(to_sql));
            }
        }
    }
    (format!(" WHERE {}", parts.join(" AND ")), params)
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(v) => SqlValue::Integer(*v),
        Value::Real(v) => SqlValue::Real(*v),
        Value::Text(v) => SqlValue::Text(v.clone()),
        Value::Bool(v) => SqlValue::Integer(i64::from(*v)),
    }
}

fn from_sql(column: &TableColumn, value: ValueRef<'_>) -> StorageResult<Value> {
    let converted = match (column.column_type, value) {
        (_, ValueRef::Null) => Value::Null,
        (ColumnType::Integer, ValueRef::Integer(v)) => Value::Integer(v),
        (ColumnType::Bool, ValueRef::Integer(v)) => Value::Bool(v != 0),
        (ColumnType::Real, ValueRef::Real(v)) => Value::Real(v),
        (ColumnType::Real, ValueRef::Integer(v)) => Value::Real(v as f64),
        (ColumnType::Text, ValueRef::Text(bytes)) => Value::Text(
            std::str::from_utf8(bytes)
                .map_err(|e| StorageError::InvalidData(format!("{}: {e}", column.name)))?
                .to_string(),
        ),
        (expected, other) => {
            return Err(StorageError::InvalidData(format!(
                "column {} holds {:?}, expected {expected}",
                column.name,
                other.data_type()
            )))
        }
    };
    Ok(converted)
}
