//! Storage-facing table definitions derived from registered schemas.

use quarry_types::ColumnType;
use serde::{Deserialize, Serialize};

/// A table as a storage backend sees it: no relationships, foreign keys
/// resolved to table names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<TableColumn>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableColumn {
    pub name: String,
    pub column_type: ColumnType,
    pub primary_key: bool,
    pub nullable: bool,
    pub unique: bool,
    /// `(table, column)` this column references.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<(String, String)>,
}

impl TableDefinition {
    pub fn primary_key(&self) -> &str {
        self.columns
            .iter()
            .find(|c| c.primary_key)
            .map_or("id", |c| c.name.as_str())
    }

    pub fn column(&self, name: &str) -> Option<&TableColumn> {
        self.columns.iter().find(|c| c.name == name)
    }
}
