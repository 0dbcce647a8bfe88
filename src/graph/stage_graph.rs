//! Stage dependency graph built with petgraph
//!
//! ## Graph Structure
//!
//! - **Directed Graph**: `A → B` means "B needs A" (A must succeed first)
//! - **Nodes**: stage names, in declaration order
//! - **Order**: Kahn's algorithm, ties broken by declaration order, so the
//!   same pipeline always runs its stages in the same sequence

use crate::core::config::StageConfig;
use crate::core::error::{ConfigError, ShipResult};
use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Reversed};
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};

pub struct StageGraph {
  graph: DiGraph<String, ()>,
  name_to_node: HashMap<String, NodeIndex>,
}

impl StageGraph {
  /// Build the graph, rejecting `needs` entries that name unknown stages
  pub fn build(stages: &[StageConfig]) -> ShipResult<Self> {
    let mut graph = DiGraph::new();
    let mut name_to_node = HashMap::new();

    for stage in stages {
      let idx = graph.add_node(stage.name.clone());
      name_to_node.insert(stage.name.clone(), idx);
    }

    for stage in stages {
      let to = name_to_node[&stage.name];
      for need in &stage.needs {
        let from = *name_to_node.get(need).ok_or_else(|| ConfigError::UnknownStage {
          stage: need.clone(),
          referenced_by: stage.name.clone(),
        })?;
        graph.update_edge(from, to, ());
      }
    }

    Ok(Self { graph, name_to_node })
  }

  /// Stages in execution order
  pub fn topological_order(&self) -> ShipResult<Vec<String>> {
    let mut in_degree: Vec<usize> = self
      .graph
      .node_indices()
      .map(|n| self.graph.neighbors_directed(n, Direction::Incoming).count())
      .collect();

    // Node indices follow declaration order
    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
      .iter()
      .enumerate()
      .filter(|(_, d)| **d == 0)
      .map(|(i, _)| Reverse(i))
      .collect();

    let mut order = Vec::with_capacity(self.graph.node_count());
    while let Some(Reverse(i)) = ready.pop() {
      let node = NodeIndex::new(i);
      order.push(self.graph[node].clone());
      for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
        in_degree[next.index()] -= 1;
        if in_degree[next.index()] == 0 {
          ready.push(Reverse(next.index()));
        }
      }
    }

    if order.len() != self.graph.node_count() {
      return Err(ConfigError::Cycle { stages: self.find_cycle() }.into());
    }
    Ok(order)
  }

  /// Names in the first strongly connected component that forms a cycle
  fn find_cycle(&self) -> Vec<String> {
    tarjan_scc(&self.graph)
      .into_iter()
      .find(|scc| scc.len() > 1 || scc.iter().any(|n| self.graph.contains_edge(*n, *n)))
      .map(|mut scc| {
        scc.sort_by_key(|n| n.index());
        let mut names: Vec<String> = scc.iter().map(|n| self.graph[*n].clone()).collect();
        if let Some(first) = names.first().cloned() {
          names.push(first);
        }
        names
      })
      .unwrap_or_default()
  }

  /// All transitive dependencies of a stage
  pub fn ancestors(&self, stage: &str) -> BTreeSet<String> {
    let Some(&start) = self.name_to_node.get(stage) else {
      return BTreeSet::new();
    };
    let reversed = Reversed(&self.graph);
    let mut dfs = Dfs::new(reversed, start);
    let mut found = BTreeSet::new();
    while let Some(node) = dfs.next(reversed) {
      if node != start {
        found.insert(self.graph[node].clone());
      }
    }
    found
  }
}
