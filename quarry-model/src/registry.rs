//! Explicit, validated registration of entity types.
//!
//! Types are registered once at startup, parents before children. A
//! relationship may name a type that is registered later; such
//! relationships are checked when the registry is frozen. The session
//! factory freezes the registry, after which it is read-only.

use crate::relationship::{Cardinality, RelationshipDescriptor};
use crate::schema::EntitySchema;
use crate::table::{TableColumn, TableDefinition};
use crate::{Entity, ModelError, ModelResult};
use quarry_types::{ColumnType, Value};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Registry of entity schemas, in registration order.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: Vec<EntitySchema>,
    by_type: HashMap<String, usize>,
    /// `(owner, relationship name)` pairs whose target was unknown at registration.
    deferred: Vec<(String, String)>,
    frozen: bool,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entity type.
    ///
    /// Re-registering an identical schema is a no-op; a different shape
    /// under the same type fails with [`ModelError::Conflict`].
    pub fn register(&mut self, schema: EntitySchema) -> ModelResult<()> {
        if self.frozen {
            return Err(ModelError::Schema(format!(
                "cannot register {}: registry is frozen once a session factory exists",
                schema.entity_type
            )));
        }

        if let Some(&idx) = self.by_type.get(&schema.entity_type) {
            if self.schemas[idx] == schema {
                debug!("Entity type {} already registered, skipping", schema.entity_type);
                return Ok(());
            }
            return Err(ModelError::Conflict(format!(
                "entity type {} is already registered with a different shape",
                schema.entity_type
            )));
        }

        if let Some(other) = self.schemas.iter().find(|s| s.table == schema.table) {
            return Err(ModelError::Conflict(format!(
                "table {} is already mapped by {}",
                schema.table, other.entity_type
            )));
        }

        self.check_columns(&schema)?;
        let deferred = self.check_relationships(&schema)?;

        debug!(
            "Registered entity type {} (table={}, columns={}, relationships={})",
            schema.entity_type,
            schema.table,
            schema.columns.len(),
            schema.relationships.len()
        );
        self.deferred.extend(deferred);
        self.by_type.insert(schema.entity_type.clone(), self.schemas.len());
        self.schemas.push(schema);
        Ok(())
    }

    /// Validates deferred relationships and makes the registry read-only.
    pub fn freeze(&mut self) -> ModelResult<()> {
        if self.frozen {
            return Ok(());
        }
        for (owner, name) in &self.deferred {
            let relationship = self.relationship(owner, name)?;
            let target = self.by_type.get(&relationship.target).ok_or_else(|| {
                ModelError::Schema(format!(
                    "relationship {owner}.{name} targets unregistered type {}",
                    relationship.target
                ))
            })?;
            check_back_population(relationship, &self.schemas[*target])?;
        }
        self.deferred.clear();
        self.frozen = true;
        debug!("Schema registry frozen with {} entity types", self.schemas.len());
        Ok(())
    }

    pub const fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Looks up a registered schema.
    pub fn resolve(&self, entity_type: &str) -> ModelResult<&EntitySchema> {
        self.by_type
            .get(entity_type)
            .map(|&idx| &self.schemas[idx])
            .ok_or_else(|| ModelError::UnknownEntity(entity_type.to_string()))
    }

    pub fn contains(&self, entity_type: &str) -> bool {
        self.by_type.contains_key(entity_type)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Registered schemas, in registration order.
    pub fn schemas(&self) -> impl Iterator<Item = &EntitySchema> {
        self.schemas.iter()
    }

    /// Looks up a relationship owned by `owner`.
    pub fn relationship(&self, owner: &str, name: &str) -> ModelResult<&RelationshipDescriptor> {
        self.resolve(owner)?.find_relationship(name).ok_or_else(|| {
            ModelError::Schema(format!("{owner} has no relationship named {name}"))
        })
    }

    /// Relationships owned by `entity_type`.
    pub fn relationships_of(&self, entity_type: &str) -> ModelResult<&[RelationshipDescriptor]> {
        Ok(&self.resolve(entity_type)?.relationships)
    }

    /// Relationships (owned by any type) whose target is `entity_type`.
    pub fn relationships_targeting<'a>(
        &'a self,
        entity_type: &'a str,
    ) -> impl Iterator<Item = &'a RelationshipDescriptor> + 'a {
        self.schemas
            .iter()
            .flat_map(|s| s.relationships.iter())
            .filter(move |r| r.target == entity_type)
    }

    /// The relationship whose back-reference is `child_type.column`, if any.
    pub fn relationship_for_back_reference(
        &self,
        child_type: &str,
        column: &str,
    ) -> Option<&RelationshipDescriptor> {
        self.schemas
            .iter()
            .flat_map(|s| s.relationships.iter())
            .find(|r| r.target == child_type && r.back_populates == column)
    }

    /// The many-to-one side of the relationship reached through
    /// `child_type.column`.
    pub fn many_to_one(&self, child_type: &str, column: &str) -> ModelResult<RelationshipDescriptor> {
        self.relationship_for_back_reference(child_type, column)
            .map(RelationshipDescriptor::mirror)
            .ok_or_else(|| {
                ModelError::Schema(format!(
                    "{child_type}.{column} is not the back-reference of any relationship"
                ))
            })
    }

    /// Storage-facing table definitions, in registration order.
    pub fn table_definitions(&self) -> Vec<TableDefinition> {
        self.schemas.iter().map(|s| self.table_definition(s)).collect()
    }

    /// Storage-facing definition of a single registered schema.
    pub fn table_definition(&self, schema: &EntitySchema) -> TableDefinition {
        let columns = schema
            .columns
            .iter()
            .map(|c| TableColumn {
                name: c.name.clone(),
                column_type: c.column_type,
                primary_key: c.primary_key,
                nullable: c.nullable,
                unique: c.unique,
                references: c.foreign_key.as_ref().map(|fk| {
                    let table = self
                        .resolve(&fk.entity_type)
                        .map_or_else(|_| fk.entity_type.clone(), |t| t.table.clone());
                    (table, fk.column.clone())
                }),
            })
            .collect();
        TableDefinition {
            name: schema.table.clone(),
            columns,
        }
    }

    /// Checks an entity's values against its registered schema.
    pub fn validate(&self, entity: &Entity) -> ModelResult<()> {
        self.resolve(&entity.entity_type)?;
        for (column, value) in &entity.values {
            self.validate_value(&entity.entity_type, column, value)?;
        }
        Ok(())
    }

    /// Rewrites an entity's values into the form its columns store them in.
    pub fn coerce(&self, entity: &mut Entity) -> ModelResult<()> {
        let schema = self.resolve(&entity.entity_type)?;
        for (column, value) in &mut entity.values {
            if let Some(def) = schema.find_column(column) {
                *value = std::mem::take(value).coerce_to(def.column_type);
            }
        }
        Ok(())
    }

    /// Checks that `value` may be stored in `entity_type.column`.
    pub fn validate_value(&self, entity_type: &str, column: &str, value: &Value) -> ModelResult<()> {
        let schema = self.resolve(entity_type)?;
        let def = schema
            .find_column(column)
            .ok_or_else(|| ModelError::invalid(entity_type, format!("unknown column {column}")))?;
        if def.primary_key {
            return Err(ModelError::invalid(
                entity_type,
                format!("primary key {column} is assigned by the backend"),
            ));
        }
        if value.is_null() && !def.nullable {
            return Err(ModelError::invalid(entity_type, format!("{column} is not nullable")));
        }
        value
            .check_type(def.column_type)
            .map_err(|e| ModelError::invalid(entity_type, format!("{column}: {e}")))
    }

    fn check_columns(&self, schema: &EntitySchema) -> ModelResult<()> {
        let ty = &schema.entity_type;
        if ty.is_empty() || schema.table.is_empty() {
            return Err(ModelError::Schema(
                "entity type and table name must not be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for column in &schema.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(ModelError::Schema(format!("{ty} declares column {} twice", column.name)));
            }
        }

        let keys: Vec<_> = schema.columns.iter().filter(|c| c.primary_key).collect();
        match keys.as_slice() {
            [] => return Err(ModelError::Schema(format!("{ty} has no primary key"))),
            [key] => {
                if key.column_type != ColumnType::Integer {
                    return Err(ModelError::Schema(format!(
                        "{ty}.{} must be an integer primary key",
                        key.name
                    )));
                }
                if key.foreign_key.is_some() {
                    return Err(ModelError::Schema(format!(
                        "{ty}.{} cannot be both primary and foreign key",
                        key.name
                    )));
                }
            }
            _ => return Err(ModelError::Schema(format!("{ty} declares more than one primary key"))),
        }

        for column in schema.foreign_key_columns() {
            let Some(fk) = column.foreign_key.as_ref() else {
                continue;
            };
            let target = if fk.entity_type == *ty {
                schema
            } else {
                self.resolve(&fk.entity_type).map_err(|_| {
                    ModelError::Schema(format!(
                        "{ty}.{} references unregistered type {}",
                        column.name, fk.entity_type
                    ))
                })?
            };
            if target.primary_key_name() != fk.column {
                return Err(ModelError::Schema(format!(
                    "{ty}.{} must reference the primary key of {}, not {}",
                    column.name, fk.entity_type, fk.column
                )));
            }
            if column.column_type != ColumnType::Integer {
                return Err(ModelError::Schema(format!(
                    "{ty}.{} references an integer key and must be an integer column",
                    column.name
                )));
            }
        }
        Ok(())
    }

    /// Validates relationships whose target is known; returns the rest.
    fn check_relationships(&self, schema: &EntitySchema) -> ModelResult<Vec<(String, String)>> {
        let ty = &schema.entity_type;
        let mut names = HashSet::new();
        let mut back_references: HashSet<(&str, &str)> = self
            .schemas
            .iter()
            .flat_map(|s| s.relationships.iter())
            .map(|r| (r.target.as_str(), r.back_populates.as_str()))
            .collect();
        let mut deferred = Vec::new();

        for relationship in &schema.relationships {
            if relationship.owner != *ty {
                return Err(ModelError::Schema(format!(
                    "relationship {} is declared on {ty} but owned by {}",
                    relationship.name, relationship.owner
                )));
            }
            if !names.insert(relationship.name.as_str()) || schema.find_column(&relationship.name).is_some() {
                return Err(ModelError::Schema(format!(
                    "{ty}.{} clashes with another field",
                    relationship.name
                )));
            }
            if relationship.cardinality == Cardinality::ManyToOne {
                return Err(ModelError::Schema(format!(
                    "{ty}.{}: declare the one-to-many side; many-to-one is its mirror",
                    relationship.name
                )));
            }
            if !back_references.insert((relationship.target.as_str(), relationship.back_populates.as_str())) {
                return Err(ModelError::Schema(format!(
                    "{ty}.{}: {}.{} already back-populates another relationship",
                    relationship.name, relationship.target, relationship.back_populates
                )));
            }

            if relationship.target == *ty {
                check_back_population(relationship, schema)?;
            } else if let Ok(target) = self.resolve(&relationship.target) {
                check_back_population(relationship, target)?;
            } else {
                deferred.push((ty.clone(), relationship.name.clone()));
            }
        }
        Ok(deferred)
    }
}

fn check_back_population(relationship: &RelationshipDescriptor, target: &EntitySchema) -> ModelResult<()> {
    let column = target.find_column(&relationship.back_populates).ok_or_else(|| {
        ModelError::Schema(format!(
            "relationship {}.{}: back-population field {} does not exist on {}",
            relationship.owner, relationship.name, relationship.back_populates, target.entity_type
        ))
    })?;
    match &column.foreign_key {
        Some(fk) if fk.entity_type == relationship.owner => Ok(()),
        _ => Err(ModelError::Schema(format!(
            "relationship {}.{}: {}.{} is not a foreign key to {}",
            relationship.owner,
            relationship.name,
            target.entity_type,
            relationship.back_populates,
            relationship.owner
        ))),
    }
}
