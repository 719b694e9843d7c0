//! Tracked instances and the session-owned bookkeeping around them.

use crate::{IdentityMap, SessionError, SessionResult};
use quarry_model::Entity;
use quarry_types::{InstanceId, Row};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Lifecycle state of a tracked instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    /// Added but never flushed; has no key yet.
    Pending,
    /// Flushed or loaded; registered in the identity map.
    Persistent,
    /// Marked for deletion at the next flush.
    Deleted,
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Persistent => write!(f, "persistent"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Tracked {
    pub entity: Entity,
    pub state: InstanceState,
    /// Order of arrival in the session.
    pub sequence: u64,
    /// Order of deletion, set when the instance is marked deleted.
    pub deleted_at: Option<u64>,
    /// Column values as last loaded or flushed.
    pub snapshot: Row,
    /// Relationship name -> children, in bind order.
    pub collections: BTreeMap<String, Vec<InstanceId>>,
    /// Back-reference column -> parent.
    pub parents: BTreeMap<String, InstanceId>,
}

impl Tracked {
    pub fn new(entity: Entity, state: InstanceState, sequence: u64) -> Self {
        let snapshot = match state {
            InstanceState::Pending => Row::new(),
            _ => entity.values.clone(),
        };
        Self {
            entity,
            state,
            sequence,
            deleted_at: None,
            snapshot,
            collections: BTreeMap::new(),
            parents: BTreeMap::new(),
        }
    }
}

/// Everything a session knows about its instances. Cloned as a checkpoint
/// before each flush so a failed flush can restore it exactly.
#[derive(Debug, Clone, Default)]
pub(crate) struct SessionState {
    pub instances: HashMap<InstanceId, Tracked>,
    pub identity: IdentityMap,
    /// Instances unbound from a delete-orphan relationship, with the
    /// back-reference column they were unbound through.
    pub orphans: Vec<(InstanceId, String)>,
    next_sequence: u64,
}

impl SessionState {
    pub fn next_sequence(&mut self) -> u64 {
        self.next_sequence += 1;
        self.next_sequence
    }

    pub fn track(&mut self, entity: Entity, state: InstanceState) -> InstanceId {
        let id = InstanceId::new();
        let sequence = self.next_sequence();
        self.instances.insert(id, Tracked::new(entity, state, sequence));
        id
    }

    pub fn get(&self, id: InstanceId) -> SessionResult<&Tracked> {
        self.instances.get(&id).ok_or(SessionError::UnknownInstance(id))
    }

    pub fn get_mut(&mut self, id: InstanceId) -> SessionResult<&mut Tracked> {
        self.instances.get_mut(&id).ok_or(SessionError::UnknownInstance(id))
    }

    /// Like [`get`](Self::get), but rejects instances marked deleted.
    pub fn live(&self, id: InstanceId, action: &str) -> SessionResult<&Tracked> {
        let tracked = self.get(id)?;
        if tracked.state == InstanceState::Deleted {
            return Err(SessionError::InvalidOperation(format!(
                "cannot {action} {id}: it is marked for deletion"
            )));
        }
        Ok(tracked)
    }

    /// A persistent instance is dirty when its values differ from the last
    /// snapshot or when one of its parents has not been inserted yet.
    pub fn is_dirty(&self, tracked: &Tracked) -> bool {
        tracked.state == InstanceState::Persistent
            && (tracked.entity.values != tracked.snapshot
                || tracked.parents.values().any(|p| {
                    self.instances
                        .get(p)
                        .is_some_and(|parent| parent.state == InstanceState::Pending)
                }))
    }

    pub fn pending(&self) -> Vec<InstanceId> {
        self.sorted(|t| (t.state == InstanceState::Pending).then_some(t.sequence))
    }

    pub fn dirty(&self) -> Vec<InstanceId> {
        self.sorted(|t| self.is_dirty(t).then_some(t.sequence))
    }

    pub fn deleted(&self) -> Vec<InstanceId> {
        self.sorted(|t| t.deleted_at)
    }

    fn sorted(&self, key: impl Fn(&Tracked) -> Option<u64>) -> Vec<InstanceId> {
        let mut ids: Vec<(u64, InstanceId)> = self
            .instances
            .iter()
            .filter_map(|(id, t)| key(t).map(|k| (k, *id)))
            .collect();
        ids.sort();
        ids.into_iter().map(|(_, id)| id).collect()
    }

    pub fn clear(&mut self) {
        self.instances.clear();
        self.identity.clear();
        self.orphans.clear();
    }
}
