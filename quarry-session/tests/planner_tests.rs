use pretty_assertions::assert_eq;
use proptest::prelude::*;
use quarry_session::{topological_order, PlanNode, SessionError};
use quarry_types::InstanceId;

fn ids(n: usize) -> Vec<InstanceId> {
    (0..n).map(|_| InstanceId::new()).collect()
}

#[test]
fn independent_nodes_keep_arrival_order() {
    let id = ids(3);
    let nodes = vec![
        PlanNode::new(id[2], 30),
        PlanNode::new(id[0], 10),
        PlanNode::new(id[1], 20),
    ];
    assert_eq!(topological_order(&nodes).unwrap(), vec![id[0], id[1], id[2]]);
}

#[test]
fn dependencies_come_first() {
    let id = ids(3);
    // The child arrived before its parent.
    let nodes = vec![
        PlanNode::new(id[0], 1).after(id[1]),
        PlanNode::new(id[1], 2),
        PlanNode::new(id[2], 3).after(id[1]),
    ];
    assert_eq!(topological_order(&nodes).unwrap(), vec![id[1], id[0], id[2]]);
}

#[test]
fn ready_nodes_are_ordered_by_sequence() {
    let id = ids(4);
    let nodes = vec![
        PlanNode::new(id[0], 1),
        PlanNode::new(id[1], 4).after(id[0]),
        PlanNode::new(id[2], 2).after(id[0]),
        PlanNode::new(id[3], 3),
    ];
    assert_eq!(topological_order(&nodes).unwrap(), vec![id[0], id[2], id[3], id[1]]);
}

#[test]
fn unknown_and_repeated_dependencies_are_ignored() {
    let id = ids(2);
    let outside = InstanceId::new();
    let nodes = vec![
        PlanNode::new(id[0], 1).after(outside),
        PlanNode::new(id[1], 2).after(id[0]).after(id[0]),
    ];
    assert_eq!(topological_order(&nodes).unwrap(), vec![id[0], id[1]]);
}

#[test]
fn cycles_name_the_stuck_nodes() {
    let id = ids(3);
    let nodes = vec![
        PlanNode::new(id[0], 1),
        PlanNode::new(id[1], 3).after(id[2]),
        PlanNode::new(id[2], 2).after(id[1]),
    ];
    match topological_order(&nodes) {
        Err(SessionError::CyclicDependency { instances }) => assert_eq!(instances, vec![id[2], id[1]]),
        other => panic!("expected a cycle, got {other:?}"),
    }
}

#[test]
fn self_dependency_is_a_cycle() {
    let id = InstanceId::new();
    let nodes = vec![PlanNode::new(id, 1).after(id)];
    assert!(matches!(
        topological_order(&nodes),
        Err(SessionError::CyclicDependency { .. })
    ));
}

#[test]
fn empty_input_is_empty_order() {
    assert!(topological_order(&[]).unwrap().is_empty());
}

proptest! {
    #[test]
    fn acyclic_graphs_order_every_node_after_its_dependencies(
        edges in proptest::collection::vec((0usize..12, 0usize..12), 0..40),
    ) {
        let id = ids(12);
        // Only edges from a later node to an earlier one, so the graph is acyclic.
        let mut nodes: Vec<PlanNode> = (0..12).map(|i| PlanNode::new(id[i], i as u64)).collect();
        for (a, b) in edges {
            if a > b {
                nodes[a].depends_on.push(id[b]);
            }
        }

        let order = topological_order(&nodes).unwrap();
        prop_assert_eq!(order.len(), nodes.len());
        let position = |x: InstanceId| order.iter().position(|o| *o == x).unwrap();
        for node in &nodes {
            for dep in &node.depends_on {
                prop_assert!(position(*dep) < position(node.id));
            }
        }
    }
}
