//! Dependency resolution — run this before persisting or executing a workflow.
//!
//! Rules enforced:
//! 1. Node ids must be unique within the workflow.
//! 2. Every connection must reference valid node ids (both source and target).
//! 3. The directed graph induced by connections must be acyclic.
//!
//! On success, produces the structures the executor's coordinator needs:
//! per-node dependency sets, dependent sets, and indegree counts.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::ValidationError;
use crate::models::Workflow;

/// Dependency structure of a validated workflow, ready for the executor's
/// scheduling loop.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// node id -> set of node ids it depends on.
    pub deps: HashMap<String, HashSet<String>>,
    /// node id -> set of node ids that depend on it.
    pub dependents: HashMap<String, HashSet<String>>,
    /// node id -> number of unsatisfied dependencies.
    pub indegree: HashMap<String, usize>,
    /// Node ids in a topologically valid order (used only for deterministic
    /// tie-breaking and tests; the executor schedules by readiness, not by
    /// this fixed order).
    pub topo_order: Vec<String>,
}

impl DependencyGraph {
    /// Node ids with no dependencies, sorted for deterministic iteration.
    pub fn roots(&self) -> Vec<String> {
        let mut roots: Vec<String> = self
            .indegree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(id, _)| id.clone())
            .collect();
        roots.sort();
        roots
    }
}

/// Validate `workflow`'s graph and build its [`DependencyGraph`].
///
/// # Errors
/// - [`ValidationError::DuplicateNodeId`] if two nodes share an id.
/// - [`ValidationError::DanglingConnection`] if a connection references a
///   missing node.
/// - [`ValidationError::CycleDetected`] if the graph is not acyclic.
pub fn build_dependency_graph(workflow: &Workflow) -> Result<DependencyGraph, ValidationError> {
    let mut seen_ids: HashSet<&str> = HashSet::new();
    for node in &workflow.nodes {
        if !seen_ids.insert(node.id.as_str()) {
            return Err(ValidationError::DuplicateNodeId(node.id.clone()));
        }
    }

    let node_set: HashSet<&str> = workflow.nodes.iter().map(|n| n.id.as_str()).collect();

    for conn in &workflow.connections {
        if !node_set.contains(conn.source_node_id.as_str()) {
            return Err(ValidationError::DanglingConnection {
                node_id: conn.source_node_id.clone(),
                side: "source",
            });
        }
        if !node_set.contains(conn.target_node_id.as_str()) {
            return Err(ValidationError::DanglingConnection {
                node_id: conn.target_node_id.clone(),
                side: "target",
            });
        }
    }

    let mut deps: HashMap<String, HashSet<String>> = HashMap::new();
    let mut dependents: HashMap<String, HashSet<String>> = HashMap::new();
    let mut indegree: HashMap<String, usize> = HashMap::new();

    for node in &workflow.nodes {
        deps.entry(node.id.clone()).or_default();
        dependents.entry(node.id.clone()).or_default();
        indegree.entry(node.id.clone()).or_insert(0);
    }

    for conn in &workflow.connections {
        let inserted = deps
            .get_mut(&conn.target_node_id)
            .expect("validated above")
            .insert(conn.source_node_id.clone());
        dependents
            .get_mut(&conn.source_node_id)
            .expect("validated above")
            .insert(conn.target_node_id.clone());
        if inserted {
            *indegree.get_mut(&conn.target_node_id).unwrap() += 1;
        }
    }

    // Kahn's algorithm, over a scratch copy of indegree, to both detect
    // cycles and produce a deterministic topo order.
    let mut scratch_indegree = indegree.clone();
    let mut queue: VecDeque<String> = scratch_indegree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(id, _)| id.clone())
        .collect();
    let mut queue_vec: Vec<String> = queue.drain(..).collect();
    queue_vec.sort();
    let mut queue: VecDeque<String> = queue_vec.into();

    let mut topo_order = Vec::with_capacity(workflow.nodes.len());
    while let Some(node_id) = queue.pop_front() {
        topo_order.push(node_id.clone());

        let mut newly_ready: Vec<String> = Vec::new();
        if let Some(ds) = dependents.get(&node_id) {
            for d in ds {
                let deg = scratch_indegree.get_mut(d).unwrap();
                *deg -= 1;
                if *deg == 0 {
                    newly_ready.push(d.clone());
                }
            }
        }
        newly_ready.sort();
        for d in newly_ready {
            queue.push_back(d);
        }
    }

    if topo_order.len() != workflow.nodes.len() {
        let remaining: Vec<String> = scratch_indegree
            .into_iter()
            .filter(|(_, d)| *d > 0)
            .map(|(id, _)| id)
            .collect();
        return Err(ValidationError::CycleDetected { nodes: remaining });
    }

    Ok(DependencyGraph {
        deps,
        dependents,
        indegree,
        topo_order,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Connection, Node, Trigger, Workflow};
    use chrono::Utc;
    use uuid::Uuid;

    fn make_node(id: &str) -> Node {
        Node {
            id: id.to_string(),
            name: String::new(),
            node_type: "echo".into(),
            config: serde_json::Value::Null,
            timeout: None,
            max_retries: None,
            retry_policy: None,
        }
    }

    fn make_conn(from: &str, to: &str) -> Connection {
        Connection {
            source_node_id: from.into(),
            target_node_id: to.into(),
            source_port: None,
            target_port: None,
            condition: None,
        }
    }

    fn make_workflow(nodes: Vec<Node>, connections: Vec<Connection>) -> Workflow {
        Workflow {
            id: Uuid::new_v4(),
            name: "test".into(),
            description: None,
            trigger: Trigger::Manual,
            nodes,
            connections,
            variables: Default::default(),
            continue_on_error: false,
            execution_timeout: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn linear_graph_has_expected_indegree_and_order() {
        let workflow = make_workflow(
            vec![make_node("a"), make_node("b"), make_node("c")],
            vec![make_conn("a", "b"), make_conn("b", "c")],
        );

        let graph = build_dependency_graph(&workflow).expect("should be valid");
        assert_eq!(graph.topo_order, vec!["a", "b", "c"]);
        assert_eq!(graph.indegree["a"], 0);
        assert_eq!(graph.indegree["b"], 1);
        assert_eq!(graph.indegree["c"], 1);
        assert_eq!(graph.roots(), vec!["a".to_string()]);
    }

    #[test]
    fn diamond_graph() {
        //   a
        //  / \
        // b   c
        //  \ /
        //   d
        let workflow = make_workflow(
            vec![make_node("a"), make_node("b"), make_node("c"), make_node("d")],
            vec![
                make_conn("a", "b"),
                make_conn("a", "c"),
                make_conn("b", "d"),
                make_conn("c", "d"),
            ],
        );

        let graph = build_dependency_graph(&workflow).expect("should be valid");
        assert_eq!(graph.topo_order.first().unwrap(), "a");
        assert_eq!(graph.topo_order.last().unwrap(), "d");
        assert_eq!(graph.indegree["d"], 2);
        assert_eq!(graph.dependents["a"].len(), 2);
    }

    #[test]
    fn duplicate_node_id_is_rejected() {
        let workflow = make_workflow(vec![make_node("a"), make_node("a")], vec![]);
        assert!(matches!(
            build_dependency_graph(&workflow),
            Err(ValidationError::DuplicateNodeId(id)) if id == "a"
        ));
    }

    #[test]
    fn connection_referencing_missing_node_is_rejected() {
        let workflow = make_workflow(vec![make_node("a")], vec![make_conn("a", "ghost")]);
        assert!(matches!(
            build_dependency_graph(&workflow),
            Err(ValidationError::DanglingConnection { node_id, .. }) if node_id == "ghost"
        ));
    }

    #[test]
    fn cycle_is_detected() {
        let workflow = make_workflow(
            vec![make_node("a"), make_node("b"), make_node("c")],
            vec![make_conn("a", "b"), make_conn("b", "c"), make_conn("c", "a")],
        );
        assert!(matches!(
            build_dependency_graph(&workflow),
            Err(ValidationError::CycleDetected { .. })
        ));
    }

    #[test]
    fn single_node_no_connections_is_valid() {
        let workflow = make_workflow(vec![make_node("solo")], vec![]);
        let graph = build_dependency_graph(&workflow).expect("single node should be valid");
        assert_eq!(graph.topo_order, vec!["solo"]);
        assert_eq!(graph.roots(), vec!["solo".to_string()]);
    }
}
