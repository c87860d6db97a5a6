//! Publish ordering: dependencies before dependents
//!
//! Kahn's algorithm over the order-gating edges (normal, build, unspecified).
//! Among packages that are ready at the same time, the lexicographically
//! smallest name goes first, so the order is stable across runs.

use crate::core::error::WorkspaceDependencyCycleError;
use crate::graph::workspace_graph::WorkspaceGraph;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};

/// Order every package in `graph` so each follows the members it depends on
pub fn publish_order(graph: &WorkspaceGraph) -> Result<Vec<String>, WorkspaceDependencyCycleError> {
  // Edge `dep → dependent`: in-degree counts unpublished dependencies
  let mut order_graph: DiGraph<&str, ()> = DiGraph::new();
  let nodes: HashMap<&str, NodeIndex> = graph
    .packages()
    .iter()
    .map(|p| (p.name.as_str(), order_graph.add_node(p.name.as_str())))
    .collect();

  for package in graph.packages() {
    let dependent = nodes[package.name.as_str()];
    for dep in graph.ordering_dependencies(&package.name) {
      if let Some(&dependency) = nodes.get(dep) {
        order_graph.update_edge(dependency, dependent, ());
      }
    }
  }

  let mut in_degree: HashMap<NodeIndex, usize> = order_graph
    .node_indices()
    .map(|node| (node, order_graph.neighbors_directed(node, Direction::Incoming).count()))
    .collect();

  let mut ready: BinaryHeap<Reverse<(&str, NodeIndex)>> = in_degree
    .iter()
    .filter(|(_, degree)| **degree == 0)
    .map(|(node, _)| Reverse((order_graph[*node], *node)))
    .collect();

  let mut order = Vec::with_capacity(graph.len());
  while let Some(Reverse((name, node))) = ready.pop() {
    order.push(name.to_string());
    for dependent in order_graph.neighbors_directed(node, Direction::Outgoing) {
      if let Some(degree) = in_degree.get_mut(&dependent) {
        *degree -= 1;
        if *degree == 0 {
          ready.push(Reverse((order_graph[dependent], dependent)));
        }
      }
    }
  }

  if order.len() == graph.len() {
    return Ok(order);
  }

  let emitted: BTreeSet<&str> = order.iter().map(String::as_str).collect();
  let members: BTreeSet<String> = in_degree
    .iter()
    .filter(|(_, degree)| **degree > 0)
    .map(|(node, _)| order_graph[*node])
    .chain(graph.packages().iter().map(|p| p.name.as_str()).filter(|name| !emitted.contains(name)))
    .map(str::to_string)
    .collect();

  Err(WorkspaceDependencyCycleError {
    members: members.into_iter().collect(),
  })
}
