//! Session factory: the explicit replacement for a global engine/session pair.

use crate::{Session, SessionConfig, SessionResult};
use quarry_model::{SchemaRegistry, TableDefinition};
use quarry_storage::StorageEngine;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Opens sessions against one storage engine with one frozen registry.
pub struct SessionFactory {
    registry: Arc<SchemaRegistry>,
    tables: Arc<HashMap<String, TableDefinition>>,
    engine: Arc<dyn StorageEngine>,
    config: SessionConfig,
}

impl SessionFactory {
    /// Freezes `registry` and, when `config.create_schema` is set, creates
    /// every registered table that does not exist yet.
    pub fn new(
        mut registry: SchemaRegistry,
        engine: Arc<dyn StorageEngine>,
        config: SessionConfig,
    ) -> SessionResult<Self> {
        registry.freeze()?;
        let tables: HashMap<String, TableDefinition> = registry
            .schemas()
            .map(|s| (s.entity_type.clone(), registry.table_definition(s)))
            .collect();
        let factory = Self {
            registry: Arc::new(registry),
            tables: Arc::new(tables),
            engine,
            config,
        };
        if factory.config.create_schema {
            factory.create_schema()?;
        }
        Ok(factory)
    }

    /// Creates all registered tables, parents first. Existing tables are kept.
    pub fn create_schema(&self) -> SessionResult<()> {
        let tables = self.registry.table_definitions();
        self.engine.create_schema(&tables)?;
        info!("Created schema with {} tables", tables.len());
        Ok(())
    }

    /// Opens a session on a fresh connection.
    pub fn open(&self) -> SessionResult<Session> {
        let connection = self.engine.connect()?;
        debug!("Opened session");
        Ok(Session::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.tables),
            connection,
            self.config.clone(),
        ))
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<dyn StorageEngine> {
        &self.engine
    }
}
