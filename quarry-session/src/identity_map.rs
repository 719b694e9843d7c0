//! Per-session identity map.
//!
//! Guarantees at most one live instance per persisted row: every row loaded
//! or flushed is registered under its `(entity type, primary key)` and later
//! loads of the same row resolve to the registered handle.

use crate::{SessionError, SessionResult};
use quarry_types::{InstanceId, PrimaryKey};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct IdentityMap {
    entries: HashMap<(String, PrimaryKey), InstanceId>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, entity_type: &str, key: PrimaryKey) -> Option<InstanceId> {
        self.entries.get(&(entity_type.to_string(), key)).copied()
    }

    /// Registers `instance` under `(entity_type, key)`.
    ///
    /// Registering the same instance twice is a no-op; a different instance
    /// under an occupied identity fails with
    /// [`SessionError::IdentityConflict`].
    pub fn put(&mut self, entity_type: &str, key: PrimaryKey, instance: InstanceId) -> SessionResult<()> {
        match self.entries.get(&(entity_type.to_string(), key)) {
            Some(existing) if *existing == instance => Ok(()),
            Some(_) => Err(SessionError::IdentityConflict {
                entity_type: entity_type.to_string(),
                key,
            }),
            None => {
                self.entries.insert((entity_type.to_string(), key), instance);
                Ok(())
            }
        }
    }

    pub fn remove(&mut self, entity_type: &str, key: PrimaryKey) -> Option<InstanceId> {
        self.entries.remove(&(entity_type.to_string(), key))
    }

    pub fn contains(&self, entity_type: &str, key: PrimaryKey) -> bool {
        self.entries.contains_key(&(entity_type.to_string(), key))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
