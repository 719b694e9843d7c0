//! Relationship binding.
//!
//! Keeps both ends of every one-to-many relationship consistent: a child is
//! in its parent's collection exactly when the child's back-reference column
//! points at that parent. All edits go through the binder, which updates
//! both sides in one step.

use crate::state::{InstanceState, SessionState};
use crate::{SessionError, SessionResult};
use quarry_model::{CascadePolicy, ModelError, RelationshipDescriptor, SchemaRegistry};
use quarry_types::{InstanceId, Value};
use tracing::debug;

pub(crate) struct Binder<'a> {
    registry: &'a SchemaRegistry,
    state: &'a mut SessionState,
}

impl<'a> Binder<'a> {
    pub fn new(registry: &'a SchemaRegistry, state: &'a mut SessionState) -> Self {
        Self { registry, state }
    }

    /// Appends `child` to `parent`'s collection and points the child's
    /// back-reference at `parent`. A child bound elsewhere is moved.
    pub fn bind_collection(
        &mut self,
        parent: InstanceId,
        child: InstanceId,
        relationship: &RelationshipDescriptor,
    ) -> SessionResult<()> {
        self.check_types(parent, child, relationship)?;
        self.state.live(parent, "bind to")?;
        self.state.live(child, "bind")?;

        let back = &relationship.back_populates;
        let current = self.state.get(child)?.parents.get(back).copied();
        if current == Some(parent) {
            return Ok(());
        }
        if let Some(old) = current {
            debug!("Re-parenting {child} from {old} to {parent} via {}", relationship.name);
            self.remove_from_collection(old, child, &relationship.name);
        }
        self.link(parent, child, relationship)
    }

    /// Removes `child` from `parent`'s collection and clears its
    /// back-reference. Under delete-orphan the child becomes an orphan
    /// candidate, resolved at the next flush.
    pub fn unbind(
        &mut self,
        parent: InstanceId,
        child: InstanceId,
        relationship: &RelationshipDescriptor,
    ) -> SessionResult<()> {
        self.check_types(parent, child, relationship)?;
        let back = &relationship.back_populates;
        if self.state.get(child)?.parents.get(back) != Some(&parent) {
            return Err(SessionError::NotBound {
                parent,
                child,
                relationship: format!("{}.{}", relationship.owner, relationship.name),
            });
        }

        self.remove_from_collection(parent, child, &relationship.name);
        let tracked = self.state.get_mut(child)?;
        tracked.parents.remove(back);
        tracked.entity.values.insert(back.clone(), Value::Null);
        if relationship.is_delete_orphan() {
            self.state.orphans.push((child, back.clone()));
        }
        Ok(())
    }

    /// Many-to-one view: points `child.column` at `parent`, or detaches it.
    pub fn set_parent(&mut self, child: InstanceId, column: &str, parent: Option<InstanceId>) -> SessionResult<()> {
        let registry = self.registry;
        let child_type = self.state.get(child)?.entity.entity_type.clone();
        let side = registry.many_to_one(&child_type, column)?;
        let relationship = registry.relationship(&side.target, &side.back_populates)?;

        if let Some(parent) = parent {
            let parent_type = &self.state.get(parent)?.entity.entity_type;
            if *parent_type != side.target {
                return Err(ModelError::Schema(format!(
                    "{child_type}.{column} refers to {}, not {parent_type}",
                    side.target
                ))
                .into());
            }
            return self.bind_collection(parent, child, relationship);
        }

        self.state.live(child, "detach")?;
        let tracked = self.state.get_mut(child)?;
        if let Some(current) = tracked.parents.get(column).copied() {
            return self.unbind(current, child, relationship);
        }
        // Bound only in storage: the parent row was never loaded.
        if tracked.entity.values.get(column).is_some_and(|v| !v.is_null()) {
            tracked.entity.values.insert(column.to_string(), Value::Null);
            if relationship.is_delete_orphan() {
                self.state.orphans.push((child, column.to_string()));
            }
        }
        Ok(())
    }

    /// Applies cascade rules for a delete of `id`, then marks it deleted.
    ///
    /// Delete-orphan children are deleted first, recursively; children of
    /// other relationships are unbound and keep living with a `NULL` foreign
    /// key. A pending instance has no row, so it is expunged instead.
    pub fn cascade_on_delete(&mut self, id: InstanceId) -> SessionResult<()> {
        let registry = self.registry;
        let tracked = self.state.get(id)?;
        if tracked.state == InstanceState::Deleted {
            return Ok(());
        }
        let entity_type = tracked.entity.entity_type.clone();

        for relationship in registry.relationships_of(&entity_type)? {
            let children = self
                .state
                .get(id)?
                .collections
                .get(&relationship.name)
                .cloned()
                .unwrap_or_default();
            match relationship.cascade {
                CascadePolicy::DeleteOrphan => {
                    for child in children {
                        self.cascade_on_delete(child)?;
                    }
                }
                CascadePolicy::None => {
                    for child in children {
                        self.unbind(id, child, relationship)?;
                    }
                }
            }
        }

        let deleted_at = self.state.next_sequence();
        let tracked = self.state.get_mut(id)?;
        match tracked.state {
            InstanceState::Pending => {
                debug!("Expunging pending {} {id}", tracked.entity.entity_type);
                self.expunge(id)?;
            }
            _ => {
                tracked.state = InstanceState::Deleted;
                tracked.deleted_at = Some(deleted_at);
            }
        }
        Ok(())
    }

    /// Binds a freshly tracked instance to the tracked instances it is
    /// related to by foreign-key value: its own parents, and children that
    /// reference its key but are not bound yet.
    pub fn attach(&mut self, id: InstanceId) -> SessionResult<()> {
        let registry = self.registry;
        let tracked = self.state.get(id)?;
        let entity_type = tracked.entity.entity_type.clone();
        let key = tracked.entity.key;
        let schema = registry.resolve(&entity_type)?;

        for column in schema.foreign_key_columns() {
            let Some(relationship) = registry.relationship_for_back_reference(&entity_type, &column.name) else {
                continue;
            };
            let tracked = self.state.get(id)?;
            if tracked.parents.contains_key(&column.name) {
                continue;
            }
            let Some(parent_key) = tracked.entity.values.get(&column.name).and_then(Value::as_key) else {
                continue;
            };
            let Some(parent) = self.state.identity.get(&relationship.owner, parent_key) else {
                continue;
            };
            if self.state.get(parent)?.state != InstanceState::Deleted {
                self.link(parent, id, relationship)?;
            }
        }

        let Some(key) = key else {
            return Ok(());
        };
        for relationship in registry.relationships_of(&entity_type)? {
            let back = &relationship.back_populates;
            let mut unbound: Vec<(u64, InstanceId)> = self
                .state
                .instances
                .iter()
                .filter(|(_, t)| {
                    t.entity.entity_type == relationship.target
                        && t.state != InstanceState::Deleted
                        && !t.parents.contains_key(back)
                        && t.entity.values.get(back) == Some(&Value::from(key))
                })
                .map(|(child, t)| (t.sequence, *child))
                .collect();
            unbound.sort();
            for (_, child) in unbound {
                self.link(id, child, relationship)?;
            }
        }
        Ok(())
    }

    /// Removes a flushed-away instance from every collection and map.
    pub fn expunge(&mut self, id: InstanceId) -> SessionResult<()> {
        let registry = self.registry;
        let Some(tracked) = self.state.instances.remove(&id) else {
            return Err(SessionError::UnknownInstance(id));
        };
        let entity_type = &tracked.entity.entity_type;

        for (column, parent) in &tracked.parents {
            if let Some(relationship) = registry.relationship_for_back_reference(entity_type, column) {
                self.remove_from_collection(*parent, id, &relationship.name);
            }
        }
        for (name, children) in &tracked.collections {
            let Some(relationship) = registry.resolve(entity_type)?.find_relationship(name) else {
                continue;
            };
            for child in children {
                if let Some(t) = self.state.instances.get_mut(child) {
                    if t.parents.get(&relationship.back_populates) == Some(&id) {
                        t.parents.remove(&relationship.back_populates);
                    }
                }
            }
        }
        if let Some(key) = tracked.entity.key {
            if self.state.identity.get(entity_type, key) == Some(id) {
                self.state.identity.remove(entity_type, key);
            }
        }
        Ok(())
    }

    fn link(&mut self, parent: InstanceId, child: InstanceId, relationship: &RelationshipDescriptor) -> SessionResult<()> {
        let parent_key = self.state.get(parent)?.entity.key;
        let tracked = self.state.get_mut(child)?;
        tracked.parents.insert(relationship.back_populates.clone(), parent);
        tracked
            .entity
            .values
            .insert(relationship.back_populates.clone(), parent_key.map_or(Value::Null, Value::from));

        let collection = self
            .state
            .get_mut(parent)?
            .collections
            .entry(relationship.name.clone())
            .or_default();
        if !collection.contains(&child) {
            collection.push(child);
        }
        Ok(())
    }

    fn remove_from_collection(&mut self, parent: InstanceId, child: InstanceId, name: &str) {
        if let Some(children) = self
            .state
            .instances
            .get_mut(&parent)
            .and_then(|p| p.collections.get_mut(name))
        {
            children.retain(|c| *c != child);
        }
    }

    fn check_types(
        &self,
        parent: InstanceId,
        child: InstanceId,
        relationship: &RelationshipDescriptor,
    ) -> SessionResult<()> {
        let parent_type = &self.state.get(parent)?.entity.entity_type;
        let child_type = &self.state.get(child)?.entity.entity_type;
        if *parent_type != relationship.owner || *child_type != relationship.target {
            return Err(ModelError::Schema(format!(
                "{}.{} links {} to {}, not {parent_type} to {child_type}",
                relationship.owner, relationship.name, relationship.owner, relationship.target
            ))
            .into());
        }
        Ok(())
    }
}
