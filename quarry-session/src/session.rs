//! The unit-of-work session.
//!
//! A [`Session`] owns one storage connection and every instance added to or
//! loaded through it. Changes accumulate in memory and reach storage only on
//! [`flush`](Session::flush) or [`commit`](Session::commit), in an order the
//! flush planner derives from foreign-key dependencies.
//!
//! # Atomicity
//!
//! Each flush runs inside a savepoint. Keys generated by the backend are
//! staged and applied to session state only after every operation has been
//! accepted; if any operation is rejected the savepoint is rolled back and
//! session state is restored to exactly what it was before the flush.

use crate::binder::Binder;
use crate::planner::{topological_order, FlushPlan, PlanNode};
use crate::query::{field, translate, Predicate, Query};
use crate::state::{InstanceState, SessionState, Tracked};
use crate::{IdentityMap, SessionConfig, SessionError, SessionResult};
use quarry_model::{Entity, ModelError, RelationshipDescriptor, SchemaRegistry, TableDefinition};
use quarry_storage::{Condition, Filter, StorageConnection};
use quarry_types::{InstanceId, PrimaryKey, Row, Value, WriteKind, WriteOperation};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Operations dispatched by one flush, in dispatch order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushSummary {
    pub operations: Vec<WriteOperation>,
}

impl FlushSummary {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn inserted(&self) -> usize {
        self.count(WriteKind::Insert)
    }

    pub fn updated(&self) -> usize {
        self.count(WriteKind::Update)
    }

    pub fn deleted(&self) -> usize {
        self.count(WriteKind::Delete)
    }

    fn count(&self, kind: WriteKind) -> usize {
        self.operations.iter().filter(|op| op.kind() == kind).count()
    }
}

/// What a successful dispatch produced, applied to session state afterwards.
#[derive(Default)]
struct Staged {
    operations: Vec<WriteOperation>,
    keys: HashMap<InstanceId, PrimaryKey>,
    written: HashMap<InstanceId, Row>,
}

/// A unit of work against one storage connection.
pub struct Session {
    registry: Arc<SchemaRegistry>,
    tables: Arc<HashMap<String, TableDefinition>>,
    connection: Box<dyn StorageConnection>,
    config: SessionConfig,
    state: SessionState,
    in_transaction: bool,
    flushes: u64,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("tracked", &self.state.instances.len())
            .field("in_transaction", &self.in_transaction)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub(crate) fn new(
        registry: Arc<SchemaRegistry>,
        tables: Arc<HashMap<String, TableDefinition>>,
        connection: Box<dyn StorageConnection>,
        config: SessionConfig,
    ) -> Self {
        Self {
            registry,
            tables,
            connection,
            config,
            state: SessionState::default(),
            in_transaction: false,
            flushes: 0,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn identity_map(&self) -> &IdentityMap {
        &self.state.identity
    }

    /// True once a flush has opened a backend transaction that has not been
    /// committed or rolled back yet.
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Number of tracked instances.
    pub fn len(&self) -> usize {
        self.state.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.instances.is_empty()
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.state.instances.contains_key(&id)
    }

    // ── Tracking ─────────────────────────────────────────────────

    /// Starts tracking `entity`.
    ///
    /// An entity without a key becomes pending. An entity carrying a key is
    /// attached as persistent and clean, unless that key is already tracked.
    pub fn add(&mut self, entity: Entity) -> SessionResult<InstanceId> {
        self.check_addable(&entity)?;
        self.track(entity)
    }

    /// Adds every entity, or none if any of them fails validation.
    pub fn add_all(&mut self, entities: impl IntoIterator<Item = Entity>) -> SessionResult<Vec<InstanceId>> {
        let entities: Vec<Entity> = entities.into_iter().collect();
        let mut keys = HashSet::new();
        for entity in &entities {
            self.check_addable(entity)?;
            if let Some(key) = entity.key {
                if !keys.insert((entity.entity_type.as_str(), key)) {
                    return Err(SessionError::AlreadyTracked {
                        entity_type: entity.entity_type.clone(),
                        key,
                    });
                }
            }
        }
        let mut ids = Vec::with_capacity(entities.len());
        for entity in entities {
            match self.track(entity) {
                Ok(id) => ids.push(id),
                Err(err) => {
                    for id in ids {
                        self.untrack(id);
                    }
                    return Err(err);
                }
            }
        }
        Ok(ids)
    }

    pub fn get(&self, id: InstanceId) -> SessionResult<&Entity> {
        Ok(&self.state.get(id)?.entity)
    }

    pub fn key(&self, id: InstanceId) -> SessionResult<Option<PrimaryKey>> {
        Ok(self.state.get(id)?.entity.key)
    }

    pub fn state(&self, id: InstanceId) -> SessionResult<InstanceState> {
        Ok(self.state.get(id)?.state)
    }

    pub fn is_dirty(&self, id: InstanceId) -> SessionResult<bool> {
        Ok(self.state.is_dirty(self.state.get(id)?))
    }

    /// Sets a column value. Primary keys and foreign keys managed by a
    /// relationship cannot be set directly.
    pub fn set(&mut self, id: InstanceId, column: &str, value: impl Into<Value>) -> SessionResult<()> {
        let value = value.into();
        let entity_type = self.state.live(id, "modify")?.entity.entity_type.clone();
        self.registry.validate_value(&entity_type, column, &value)?;
        if self.registry.relationship_for_back_reference(&entity_type, column).is_some() {
            return Err(SessionError::InvalidOperation(format!(
                "{entity_type}.{column} is managed by a relationship; use set_parent"
            )));
        }
        let value = match self.registry.resolve(&entity_type)?.find_column(column) {
            Some(def) => value.coerce_to(def.column_type),
            None => value,
        };
        self.state.get_mut(id)?.entity.values.insert(column.to_string(), value);
        Ok(())
    }

    // ── Relationships ────────────────────────────────────────────

    /// Appends `child` to `parent.relationship`, re-parenting it if needed.
    pub fn append(&mut self, parent: InstanceId, relationship: &str, child: InstanceId) -> SessionResult<()> {
        let descriptor = self.relationship_of(parent, relationship)?;
        Binder::new(&self.registry, &mut self.state).bind_collection(parent, child, &descriptor)
    }

    /// Removes `child` from `parent.relationship`.
    pub fn remove(&mut self, parent: InstanceId, relationship: &str, child: InstanceId) -> SessionResult<()> {
        let descriptor = self.relationship_of(parent, relationship)?;
        Binder::new(&self.registry, &mut self.state).unbind(parent, child, &descriptor)
    }

    /// Points the back-reference `column` of `child` at `parent`, or clears it.
    pub fn set_parent(&mut self, child: InstanceId, column: &str, parent: Option<InstanceId>) -> SessionResult<()> {
        Binder::new(&self.registry, &mut self.state).set_parent(child, column, parent)
    }

    /// Current members of `parent.relationship`, in bind order.
    pub fn children(&self, parent: InstanceId, relationship: &str) -> SessionResult<Vec<InstanceId>> {
        let descriptor = self.relationship_of(parent, relationship)?;
        Ok(self
            .state
            .get(parent)?
            .collections
            .get(&descriptor.name)
            .cloned()
            .unwrap_or_default())
    }

    /// The tracked parent `child.column` points at, if any.
    pub fn parent(&self, child: InstanceId, column: &str) -> SessionResult<Option<InstanceId>> {
        let tracked = self.state.get(child)?;
        self.registry.many_to_one(&tracked.entity.entity_type, column)?;
        Ok(tracked.parents.get(column).copied())
    }

    // ── Deletion ─────────────────────────────────────────────────

    /// Marks an instance for deletion and applies cascade rules.
    ///
    /// Related rows that were never loaded are loaded first so cascades see
    /// every child. A pending instance is simply dropped from the session.
    pub fn delete(&mut self, id: InstanceId) -> SessionResult<()> {
        if self.state.get(id)?.state == InstanceState::Deleted {
            return Ok(());
        }
        self.load_cascade(id, &mut HashSet::new())?;
        Binder::new(&self.registry, &mut self.state).cascade_on_delete(id)
    }

    pub fn new_instances(&self) -> Vec<InstanceId> {
        self.state.pending()
    }

    pub fn dirty_instances(&self) -> Vec<InstanceId> {
        self.state.dirty()
    }

    pub fn deleted_instances(&self) -> Vec<InstanceId> {
        self.state.deleted()
    }

    // ── Flush / commit / rollback ────────────────────────────────

    /// The write plan the next flush would dispatch, before orphan
    /// resolution.
    pub fn plan(&self) -> SessionResult<FlushPlan> {
        let mut inserts = Vec::new();
        for id in self.state.pending() {
            let tracked = self.state.get(id)?;
            let mut node = PlanNode::new(id, tracked.sequence);
            for parent in tracked.parents.values() {
                if self.state.get(*parent)?.state == InstanceState::Pending {
                    node = node.after(*parent);
                }
            }
            inserts.push(node);
        }

        let deleted = self.state.deleted();
        let mut by_key: HashMap<(&str, PrimaryKey), InstanceId> = HashMap::new();
        let mut deletes: Vec<PlanNode> = Vec::with_capacity(deleted.len());
        for id in &deleted {
            let tracked = self.state.get(*id)?;
            if let Some(key) = tracked.entity.key {
                by_key.insert((tracked.entity.entity_type.as_str(), key), *id);
            }
            deletes.push(PlanNode::new(*id, tracked.deleted_at.unwrap_or(tracked.sequence)));
        }
        // A parent row can only go once every deleted child referencing it is gone.
        let position: HashMap<InstanceId, usize> = deleted.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        for child in &deleted {
            let tracked = self.state.get(*child)?;
            let schema = self.registry.resolve(&tracked.entity.entity_type)?;
            let mut referenced: Vec<InstanceId> = tracked.parents.values().copied().collect();
            for column in schema.foreign_key_columns() {
                let (Some(fk), Some(key)) = (
                    column.foreign_key.as_ref(),
                    tracked.entity.values.get(&column.name).and_then(Value::as_key),
                ) else {
                    continue;
                };
                if let Some(parent) = by_key.get(&(fk.entity_type.as_str(), key)) {
                    referenced.push(*parent);
                }
            }
            for parent in referenced {
                if parent == *child {
                    continue;
                }
                if let Some(&i) = position.get(&parent) {
                    deletes[i].depends_on.push(*child);
                }
            }
        }

        Ok(FlushPlan {
            inserts: topological_order(&inserts)?,
            updates: self.state.dirty(),
            deletes: topological_order(&deletes)?,
        })
    }

    /// Writes all pending changes to the storage connection.
    ///
    /// Opens the backend transaction on first use. A flush with nothing to
    /// do never touches the connection.
    pub fn flush(&mut self) -> SessionResult<FlushSummary> {
        let checkpoint = self.state.clone();
        let was_in_transaction = self.in_transaction;
        match self.flush_inner() {
            Ok(summary) => Ok(summary),
            Err(err) => {
                if was_in_transaction && !self.in_transaction {
                    // Earlier flushes went down with the transaction.
                    self.state.clear();
                } else {
                    self.state = checkpoint;
                }
                Err(err)
            }
        }
    }

    /// Flushes, then commits the backend transaction.
    ///
    /// If the backend refuses the commit, its transaction is gone: the
    /// session is cleared as if rolled back and the error is returned.
    pub fn commit(&mut self) -> SessionResult<FlushSummary> {
        let summary = self.flush()?;
        if self.in_transaction {
            self.in_transaction = false;
            if let Err(err) = self.connection.commit() {
                warn!("Commit failed, discarding session state: {err}");
                if self.connection.in_transaction() {
                    if let Err(e) = self.connection.rollback() {
                        warn!("Rollback after failed commit also failed: {e}");
                    }
                }
                self.state.clear();
                return Err(err.into());
            }
            debug!("Committed transaction ({} tracked instances)", self.state.instances.len());
        }
        Ok(summary)
    }

    /// Rolls back the backend transaction and forgets every tracked instance.
    pub fn rollback(&mut self) -> SessionResult<()> {
        self.state.clear();
        if self.in_transaction {
            self.in_transaction = false;
            self.connection.rollback()?;
            debug!("Rolled back transaction");
        }
        Ok(())
    }

    /// Rolls back anything uncommitted and ends the session.
    pub fn close(mut self) -> SessionResult<()> {
        self.rollback()
    }

    fn flush_inner(&mut self) -> SessionResult<FlushSummary> {
        self.resolve_orphans()?;
        let plan = self.plan()?;
        if plan.is_empty() {
            return Ok(FlushSummary::default());
        }

        if !self.in_transaction {
            self.connection.begin()?;
            self.in_transaction = true;
        }
        self.flushes += 1;
        let savepoint = format!("{}_{}", self.config.savepoint_prefix, self.flushes);
        self.connection.savepoint(&savepoint)?;

        let staged = self
            .dispatch(&plan)
            .and_then(|staged| {
                self.connection.release(&savepoint)?;
                Ok(staged)
            });
        let staged = match staged {
            Ok(staged) => staged,
            Err(err) => {
                self.undo_flush(&savepoint);
                warn!("Flush rolled back: {err}");
                return Err(err);
            }
        };
        self.apply(&plan, staged)
    }

    /// Discards the writes made since `savepoint`. If the savepoint is gone
    /// the whole backend transaction is rolled back, so storage never keeps
    /// rows the session no longer knows it wrote.
    fn undo_flush(&mut self, savepoint: &str) {
        let undone = self
            .connection
            .rollback_to(savepoint)
            .and_then(|()| self.connection.release(savepoint));
        if let Err(e) = undone {
            warn!("Failed to roll back to savepoint {savepoint}: {e}");
            if self.connection.in_transaction() {
                if let Err(e) = self.connection.rollback() {
                    warn!("Rollback after failed savepoint also failed: {e}");
                }
            }
            self.in_transaction = false;
        }
    }

    /// Deletes orphan candidates that were not re-parented since they were
    /// unbound.
    fn resolve_orphans(&mut self) -> SessionResult<()> {
        let candidates = std::mem::take(&mut self.state.orphans);
        for (id, back_reference) in candidates {
            let Some(tracked) = self.state.instances.get(&id) else {
                continue;
            };
            if tracked.state == InstanceState::Deleted || tracked.parents.contains_key(&back_reference) {
                continue;
            }
            debug!("Deleting orphaned {} {id}", tracked.entity.entity_type);
            self.delete(id)?;
        }
        Ok(())
    }

    fn dispatch(&mut self, plan: &FlushPlan) -> SessionResult<Staged> {
        let mut staged = Staged::default();

        for id in &plan.inserts {
            let tracked = self.state.get(*id)?;
            let entity_type = tracked.entity.entity_type.clone();
            let table = table_for(&self.tables, &entity_type)?;
            let values = effective_values(&self.state, tracked, &staged.keys);
            let operation = WriteOperation::Insert {
                entity_type: entity_type.clone(),
                table: table.name.clone(),
                values: values.clone(),
            };
            self.echo(&operation);
            let key = self
                .connection
                .execute_insert(table, &values)
                .map_err(|source| persistence(&operation, source))?;
            if self.state.identity.contains(&entity_type, key) {
                return Err(SessionError::IdentityConflict { entity_type, key });
            }
            staged.keys.insert(*id, key);
            staged.written.insert(*id, values);
            staged.operations.push(operation);
        }

        for id in &plan.updates {
            let tracked = self.state.get(*id)?;
            let (entity_type, key) = persisted(tracked)?;
            let table = table_for(&self.tables, &entity_type)?;
            let values = effective_values(&self.state, tracked, &staged.keys);
            let changed: Row = values
                .iter()
                .filter(|(column, value)| tracked.snapshot.get(*column) != Some(*value))
                .map(|(column, value)| (column.clone(), value.clone()))
                .collect();
            staged.written.insert(*id, values);
            if changed.is_empty() {
                continue;
            }
            let operation = WriteOperation::Update {
                entity_type,
                table: table.name.clone(),
                key,
                values: changed.clone(),
            };
            self.echo(&operation);
            self.connection
                .execute_update(table, key, &changed)
                .map_err(|source| persistence(&operation, source))?;
            staged.operations.push(operation);
        }

        for id in &plan.deletes {
            let (entity_type, key) = persisted(self.state.get(*id)?)?;
            let table = table_for(&self.tables, &entity_type)?;
            let operation = WriteOperation::Delete {
                entity_type,
                table: table.name.clone(),
                key,
            };
            self.echo(&operation);
            self.connection
                .execute_delete(table, key)
                .map_err(|source| persistence(&operation, source))?;
            staged.operations.push(operation);
        }

        Ok(staged)
    }

    fn apply(&mut self, plan: &FlushPlan, mut staged: Staged) -> SessionResult<FlushSummary> {
        for id in &plan.inserts {
            let Some(&key) = staged.keys.get(id) else {
                continue;
            };
            let tracked = self.state.get_mut(*id)?;
            tracked.entity.key = Some(key);
            tracked.state = InstanceState::Persistent;
            if let Some(values) = staged.written.remove(id) {
                tracked.entity.values.clone_from(&values);
                tracked.snapshot = values;
            }
            let entity_type = tracked.entity.entity_type.clone();
            self.state.identity.put(&entity_type, key, *id)?;
        }
        for id in &plan.updates {
            if let Some(values) = staged.written.remove(id) {
                let tracked = self.state.get_mut(*id)?;
                tracked.entity.values.clone_from(&values);
                tracked.snapshot = values;
            }
        }
        let mut binder = Binder::new(&self.registry, &mut self.state);
        for id in &plan.deletes {
            binder.expunge(*id)?;
        }

        let summary = FlushSummary {
            operations: staged.operations,
        };
        debug!(
            "Flushed {} inserts, {} updates, {} deletes",
            summary.inserted(),
            summary.updated(),
            summary.deleted()
        );
        Ok(summary)
    }

    // ── Queries ──────────────────────────────────────────────────

    /// Starts a query over `entity_type`.
    pub fn query(&mut self, entity_type: &str) -> Query<'_> {
        Query::new(self, entity_type)
    }

    /// Returns the instance for `(entity_type, key)`, from the identity map
    /// if tracked, from storage otherwise.
    pub fn find(&mut self, entity_type: &str, key: PrimaryKey) -> SessionResult<Option<InstanceId>> {
        if let Some(id) = self.state.identity.get(entity_type, key) {
            let deleted = self.state.get(id)?.state == InstanceState::Deleted;
            return Ok((!deleted).then_some(id));
        }
        let pk = self.registry.resolve(entity_type)?.primary_key_name().to_string();
        Ok(self.select(entity_type, &[field(pk).eq(key)])?.into_iter().next())
    }

    /// Loads every stored child of `parent.relationship` into the session
    /// and returns the collection.
    pub fn load_related(&mut self, parent: InstanceId, relationship: &str) -> SessionResult<Vec<InstanceId>> {
        let descriptor = self.relationship_of(parent, relationship)?;
        self.state.live(parent, "load relationships of")?;
        if self.config.autoflush {
            self.flush()?;
        }
        self.load_children(parent, &descriptor)?;
        self.children(parent, relationship)
    }

    pub(crate) fn select(&mut self, entity_type: &str, predicates: &[Predicate]) -> SessionResult<Vec<InstanceId>> {
        let filter = translate(self.registry.resolve(entity_type)?, predicates)?;
        if self.config.autoflush {
            self.flush()?;
        }
        let table = table_for(&self.tables, entity_type)?;
        let rows = self.connection.execute_select(table, &filter)?;
        self.hydrate(entity_type, rows)
    }

    /// Resolves loaded rows through the identity map. Tracked rows keep
    /// their in-memory state; new rows are tracked as persistent and bound
    /// to related tracked instances.
    fn hydrate(&mut self, entity_type: &str, rows: Vec<Row>) -> SessionResult<Vec<InstanceId>> {
        let pk = self.registry.resolve(entity_type)?.primary_key_name().to_string();
        let mut ids = Vec::with_capacity(rows.len());
        for mut row in rows {
            let key = row.remove(&pk).and_then(|v| v.as_key()).ok_or_else(|| {
                SessionError::Storage(quarry_storage::StorageError::InvalidData(format!(
                    "{entity_type} row without an integer {pk}"
                )))
            })?;
            if let Some(id) = self.state.identity.get(entity_type, key) {
                if self.state.get(id)?.state != InstanceState::Deleted {
                    ids.push(id);
                }
                continue;
            }
            ids.push(self.track(Entity::with_key(entity_type, key, row))?);
        }
        Ok(ids)
    }

    fn load_children(&mut self, parent: InstanceId, relationship: &RelationshipDescriptor) -> SessionResult<()> {
        let Some(key) = self.state.get(parent)?.entity.key else {
            return Ok(());
        };
        let table = table_for(&self.tables, &relationship.target)?;
        let filter = Filter::all().and(Condition::equals(relationship.back_populates.as_str(), key.into()));
        let rows = self.connection.execute_select(table, &filter)?;
        self.hydrate(&relationship.target, rows)?;
        Ok(())
    }

    /// Loads, recursively, every child a delete of `id` cascades to.
    fn load_cascade(&mut self, id: InstanceId, visited: &mut HashSet<InstanceId>) -> SessionResult<()> {
        if !visited.insert(id) || self.state.get(id)?.state != InstanceState::Persistent {
            return Ok(());
        }
        let registry = Arc::clone(&self.registry);
        let entity_type = self.state.get(id)?.entity.entity_type.clone();
        for relationship in registry.relationships_of(&entity_type)? {
            self.load_children(id, relationship)?;
            if relationship.is_delete_orphan() {
                for child in self.children(id, &relationship.name)? {
                    self.load_cascade(child, visited)?;
                }
            }
        }
        Ok(())
    }

    // ── Helpers ──────────────────────────────────────────────────

    fn check_addable(&self, entity: &Entity) -> SessionResult<()> {
        self.registry.validate(entity)?;
        if let Some(key) = entity.key {
            if self.state.identity.contains(&entity.entity_type, key) {
                return Err(SessionError::AlreadyTracked {
                    entity_type: entity.entity_type.clone(),
                    key,
                });
            }
        }
        Ok(())
    }

    fn track(&mut self, mut entity: Entity) -> SessionResult<InstanceId> {
        self.registry.coerce(&mut entity)?;
        let entity_type = entity.entity_type.clone();
        let key = entity.key;
        let state = if key.is_some() {
            InstanceState::Persistent
        } else {
            InstanceState::Pending
        };
        let id = self.state.track(entity, state);
        let attached = match key {
            Some(key) => self.state.identity.put(&entity_type, key, id),
            None => Ok(()),
        }
        .and_then(|()| Binder::new(&self.registry, &mut self.state).attach(id));
        if let Err(err) = attached {
            self.untrack(id);
            return Err(err);
        }
        Ok(id)
    }

    /// Forgets an instance whose tracking failed part-way.
    fn untrack(&mut self, id: InstanceId) {
        if let Err(e) = Binder::new(&self.registry, &mut self.state).expunge(id) {
            warn!("Failed to untrack {id}: {e}");
        }
    }

    fn relationship_of(&self, parent: InstanceId, name: &str) -> SessionResult<RelationshipDescriptor> {
        let entity_type = &self.state.get(parent)?.entity.entity_type;
        Ok(self.registry.relationship(entity_type, name)?.clone())
    }

    fn echo(&self, operation: &WriteOperation) {
        if self.config.echo {
            info!("{operation}");
        } else {
            debug!("{operation}");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.in_transaction {
            if let Err(e) = self.connection.rollback() {
                warn!("Failed to roll back session on drop: {e}");
            }
        }
    }
}

fn table_for<'t>(tables: &'t HashMap<String, TableDefinition>, entity_type: &str) -> SessionResult<&'t TableDefinition> {
    tables
        .get(entity_type)
        .ok_or_else(|| ModelError::UnknownEntity(entity_type.to_string()).into())
}

fn persisted(tracked: &Tracked) -> SessionResult<(String, PrimaryKey)> {
    let key = tracked.entity.key.ok_or_else(|| {
        SessionError::InvalidOperation(format!("{} has no primary key", tracked.entity.entity_type))
    })?;
    Ok((tracked.entity.entity_type.clone(), key))
}

fn persistence(operation: &WriteOperation, source: quarry_storage::StorageError) -> SessionError {
    SessionError::Persistence {
        operation: Box::new(operation.clone()),
        source,
    }
}

/// Column values with every bound back-reference resolved to the parent's
/// key, using keys staged earlier in the same flush.
fn effective_values(state: &SessionState, tracked: &Tracked, staged: &HashMap<InstanceId, PrimaryKey>) -> Row {
    let mut values = tracked.entity.values.clone();
    for (column, parent) in &tracked.parents {
        let key = staged
            .get(parent)
            .copied()
            .or_else(|| state.instances.get(parent).and_then(|p| p.entity.key));
        values.insert(column.clone(), key.map_or(Value::Null, Value::from));
    }
    values
}
