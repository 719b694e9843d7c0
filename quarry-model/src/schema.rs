use crate::relationship::RelationshipDescriptor;
use quarry_types::ColumnType;
use serde::{Deserialize, Serialize};

/// Describes an entity type's table: name, columns and relationships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySchema {
    pub entity_type: String,
    pub table: String,
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub relationships: Vec<RelationshipDescriptor>,
}

impl EntitySchema {
    pub fn new(entity_type: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            table: table.into(),
            columns: Vec::new(),
            relationships: Vec::new(),
        }
    }

    #[must_use]
    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    /// Adds a relationship owned by this type. The descriptor's owner is
    /// overwritten with this schema's entity type.
    #[must_use]
    pub fn relationship(mut self, mut relationship: RelationshipDescriptor) -> Self {
        relationship.owner.clone_from(&self.entity_type);
        self.relationships.push(relationship);
        self
    }

    /// The primary-key column, if one was declared.
    pub fn primary_key(&self) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.primary_key)
    }

    /// Name of the primary-key column. Registered schemas always have one.
    pub fn primary_key_name(&self) -> &str {
        self.primary_key().map_or("id", |c| c.name.as_str())
    }

    pub fn find_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn find_relationship(&self, name: &str) -> Option<&RelationshipDescriptor> {
        self.relationships.iter().find(|r| r.name == name)
    }

    /// Non-key columns, in declaration order.
    pub fn value_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|c| !c.primary_key)
    }

    /// Columns carrying a foreign key, in declaration order.
    pub fn foreign_key_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|c| c.foreign_key.is_some())
    }
}

/// Target of a foreign-key column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub entity_type: String,
    pub column: String,
}

/// A single column of an entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<ForeignKey>,
}

const fn default_nullable() -> bool {
    true
}

impl ColumnDef {
    fn simple(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            primary_key: false,
            nullable: true,
            unique: false,
            foreign_key: None,
        }
    }

    /// Integer primary key, generated by the backend.
    pub fn primary_key(name: &str) -> Self {
        Self {
            primary_key: true,
            nullable: false,
            ..Self::simple(name, ColumnType::Integer)
        }
    }

    pub fn integer(name: &str) -> Self {
        Self::simple(name, ColumnType::Integer)
    }

    pub fn real(name: &str) -> Self {
        Self::simple(name, ColumnType::Real)
    }

    pub fn text(name: &str) -> Self {
        Self::simple(name, ColumnType::Text)
    }

    pub fn bool(name: &str) -> Self {
        Self::simple(name, ColumnType::Bool)
    }

    /// Integer column referencing `entity_type.column`.
    pub fn foreign_key(name: &str, entity_type: &str, column: &str) -> Self {
        Self {
            foreign_key: Some(ForeignKey {
                entity_type: entity_type.into(),
                column: column.into(),
            }),
            ..Self::simple(name, ColumnType::Integer)
        }
    }

    #[must_use]
    pub const fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}
