//! Flush ordering.
//!
//! Inserts run parents-first, deletes run children-first, updates sit in
//! between. Within each phase the order is a topological sort (Kahn's
//! algorithm) where ready nodes are taken by ascending sequence, so the
//! same batch always produces the same plan.

use crate::{SessionError, SessionResult};
use quarry_types::InstanceId;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// One instance in a flush phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanNode {
    pub id: InstanceId,
    /// Tie-breaker among nodes that are ready at the same time.
    pub sequence: u64,
    /// Nodes that must be dispatched before this one. Ids outside the phase
    /// are ignored.
    pub depends_on: Vec<InstanceId>,
}

impl PlanNode {
    pub fn new(id: InstanceId, sequence: u64) -> Self {
        Self {
            id,
            sequence,
            depends_on: Vec::new(),
        }
    }

    #[must_use]
    pub fn after(mut self, dependency: InstanceId) -> Self {
        self.depends_on.push(dependency);
        self
    }
}

/// The ordered write plan for one flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushPlan {
    pub inserts: Vec<InstanceId>,
    pub updates: Vec<InstanceId>,
    pub deletes: Vec<InstanceId>,
}

impl FlushPlan {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inserts.len() + self.updates.len() + self.deletes.len()
    }
}

/// Orders `nodes` so every node comes after its dependencies.
///
/// Fails with [`SessionError::CyclicDependency`] naming every node that
/// could not be ordered.
pub fn topological_order(nodes: &[PlanNode]) -> SessionResult<Vec<InstanceId>> {
    let index: HashMap<InstanceId, usize> = nodes.iter().enumerate().map(|(i, n)| (n.id, i)).collect();
    let mut in_degree = vec![0usize; nodes.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];

    for (i, node) in nodes.iter().enumerate() {
        let mut seen = Vec::new();
        for dep in &node.depends_on {
            let Some(&d) = index.get(dep) else {
                continue;
            };
            if seen.contains(&d) {
                continue;
            }
            seen.push(d);
            in_degree[i] += 1;
            dependents[d].push(i);
        }
    }

    let mut ready: BinaryHeap<Reverse<(u64, usize)>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, deg)| **deg == 0)
        .map(|(i, _)| Reverse((nodes[i].sequence, i)))
        .collect();

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(Reverse((_, i))) = ready.pop() {
        order.push(nodes[i].id);
        for &next in &dependents[i] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(Reverse((nodes[next].sequence, next)));
            }
        }
    }

    if order.len() < nodes.len() {
        let mut stuck: Vec<&PlanNode> = nodes
            .iter()
            .enumerate()
            .filter(|(i, _)| in_degree[*i] > 0)
            .map(|(_, n)| n)
            .collect();
        stuck.sort_by_key(|n| n.sequence);
        return Err(SessionError::CyclicDependency {
            instances: stuck.into_iter().map(|n| n.id).collect(),
        });
    }
    Ok(order)
}
