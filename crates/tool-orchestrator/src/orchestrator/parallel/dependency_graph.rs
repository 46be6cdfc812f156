//! Dependency graph representation for parallel execution.
//!
//! Nodes live in an arena and are addressed by integer index; ids are only
//! used at the boundary. Traversals are iterative with an explicit stack, so
//! very deep chains do not exhaust the thread stack.

use crate::orchestrator::OrchestratorError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A directed graph of call dependencies.
///
/// The graph maintains both forward edges (dependencies) and reverse edges
/// (dependents). Node order is insertion order, which is also the order
/// used to break ties when grouping nodes into levels.
///
/// # Examples
///
/// ```ignore
/// use tool_orchestrator::orchestrator::parallel::DependencyGraph;
///
/// let mut graph = DependencyGraph::new();
/// graph.add_node("1");
/// graph.add_node("2");
/// graph.add_dependency("2", "1"); // 2 depends on 1
///
/// assert_eq!(graph.levels()?, vec![vec!["1".to_string()], vec!["2".to_string()]]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    ids: Vec<String>,
    index: HashMap<String, usize>,
    /// Forward edges: node -> nodes it depends on
    dependencies: Vec<Vec<usize>>,
    /// Reverse edges: node -> nodes that depend on it
    dependents: Vec<Vec<usize>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Finished,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node and returns its index. Existing nodes are returned as is.
    pub fn add_node(&mut self, id: &str) -> usize {
        if let Some(&idx) = self.index.get(id) {
            return idx;
        }
        let idx = self.ids.len();
        self.ids.push(id.to_string());
        self.index.insert(id.to_string(), idx);
        self.dependencies.push(Vec::new());
        self.dependents.push(Vec::new());
        idx
    }

    /// Adds a dependency edge: `id` depends on `depends_on`.
    ///
    /// Missing nodes are created. Duplicate edges are ignored.
    pub fn add_dependency(&mut self, id: &str, depends_on: &str) {
        let node = self.add_node(id);
        let dep = self.add_node(depends_on);
        self.add_edge(node, dep);
    }

    /// Index-based variant of [`add_dependency`](Self::add_dependency).
    pub fn add_edge(&mut self, node: usize, depends_on: usize) {
        if !self.dependencies[node].contains(&depends_on) {
            self.dependencies[node].push(depends_on);
            self.dependents[depends_on].push(node);
        }
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn id_of(&self, idx: usize) -> Option<&str> {
        self.ids.get(idx).map(String::as_str)
    }

    /// Ids the given node depends on, in edge insertion order.
    pub fn get_dependencies(&self, id: &str) -> Vec<String> {
        self.index_of(id)
            .map(|idx| self.names(&self.dependencies[idx]))
            .unwrap_or_default()
    }

    /// Ids that depend on the given node.
    pub fn get_dependents(&self, id: &str) -> Vec<String> {
        self.index_of(id)
            .map(|idx| self.names(&self.dependents[idx]))
            .unwrap_or_default()
    }

    fn names(&self, indices: &[usize]) -> Vec<String> {
        indices.iter().map(|&i| self.ids[i].clone()).collect()
    }

    pub fn node_count(&self) -> usize {
        self.ids.len()
    }

    pub fn edge_count(&self) -> usize {
        self.dependencies.iter().map(Vec::len).sum()
    }

    /// All nodes without dependencies, in insertion order.
    pub fn get_zero_dependency_nodes(&self) -> Vec<String> {
        (0..self.ids.len())
            .filter(|&i| self.dependencies[i].is_empty())
            .map(|i| self.ids[i].clone())
            .collect()
    }

    /// Depth-first post-order over dependency edges.
    ///
    /// Dependencies are emitted before their dependents. On a back edge the
    /// cycle is returned as a path that starts and ends on the same node.
    fn post_order(&self) -> Result<Vec<usize>, Vec<usize>> {
        let n = self.ids.len();
        let mut marks = vec![Mark::Unvisited; n];
        let mut order = Vec::with_capacity(n);
        // (node, index of the next dependency to visit)
        let mut stack: Vec<(usize, usize)> = Vec::new();

        for root in 0..n {
            if marks[root] != Mark::Unvisited {
                continue;
            }
            marks[root] = Mark::Visiting;
            stack.push((root, 0));

            while let Some(frame) = stack.last_mut() {
                let node = frame.0;
                let Some(&dep) = self.dependencies[node].get(frame.1) else {
                    marks[node] = Mark::Finished;
                    order.push(node);
                    stack.pop();
                    continue;
                };
                frame.1 += 1;

                match marks[dep] {
                    Mark::Unvisited => {
                        marks[dep] = Mark::Visiting;
                        stack.push((dep, 0));
                    }
                    Mark::Visiting => {
                        let start = stack.iter().position(|&(n, _)| n == dep).unwrap_or(0);
                        let mut cycle: Vec<usize> = stack[start..].iter().map(|&(n, _)| n).collect();
                        cycle.push(dep);
                        return Err(cycle);
                    }
                    Mark::Finished => {}
                }
            }
        }

        Ok(order)
    }

    /// Returns the first cycle found, as a list of ids where the first and
    /// last entries are the same node.
    pub fn detect_cycle(&self) -> Option<Vec<String>> {
        self.post_order().err().map(|cycle| self.names(&cycle))
    }

    pub fn has_cycle(&self) -> bool {
        self.post_order().is_err()
    }

    /// A total order in which every node appears after all its dependencies.
    pub fn topological_order(&self) -> Result<Vec<String>, OrchestratorError> {
        self.post_order()
            .map(|order| self.names(&order))
            .map_err(|cycle| OrchestratorError::CircularDependency {
                cycle: self.names(&cycle),
            })
    }

    /// Groups nodes into levels.
    ///
    /// A node's level is one more than the highest level among its
    /// dependencies, or 0 without dependencies. Within a level nodes keep
    /// insertion order.
    pub fn levels(&self) -> Result<Vec<Vec<String>>, OrchestratorError> {
        Ok(self.plan()?.levels)
    }

    /// Builds the full execution plan (topological order plus levels).
    pub fn plan(&self) -> Result<ExecutionPlan, OrchestratorError> {
        let order = self
            .post_order()
            .map_err(|cycle| OrchestratorError::CircularDependency {
                cycle: self.names(&cycle),
            })?;

        let mut level_of = vec![0usize; self.ids.len()];
        for &node in &order {
            level_of[node] = self.dependencies[node]
                .iter()
                .map(|&dep| level_of[dep] + 1)
                .max()
                .unwrap_or(0);
        }

        let level_count = level_of.iter().map(|l| l + 1).max().unwrap_or(0);
        let mut levels = vec![Vec::new(); level_count];
        for (node, &level) in level_of.iter().enumerate() {
            levels[level].push(self.ids[node].clone());
        }

        Ok(ExecutionPlan {
            order: self.names(&order),
            levels,
        })
    }
}

/// Topological order plus the level partition of a call batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Every call after all of its dependencies.
    pub order: Vec<String>,
    /// Calls grouped by level; all dependencies of a level-N call live in levels < N.
    pub levels: Vec<Vec<String>>,
}

impl ExecutionPlan {
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Size of the largest level.
    pub fn max_parallelism(&self) -> usize {
        self.levels.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn level_of(&self, call_id: &str) -> Option<usize> {
        self.levels
            .iter()
            .position(|level| level.iter().any(|id| id == call_id))
    }
}
