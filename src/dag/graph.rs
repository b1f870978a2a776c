// src/dag/graph.rs

use std::collections::{BTreeMap, HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Control, DfsEvent, depth_first_search};

use crate::config::model::TaskSpec;
use crate::engine::TaskId;
use crate::errors::ValidationError;

/// Immutable task graph.
///
/// Node `i` of the underlying petgraph graph is the task at insertion index
/// `i`; edges point from a dependency to its dependent. Construction through
/// [`TaskGraph::build`] guarantees unique ids, known dependencies and
/// acyclicity, so the scheduler never re-checks them.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    tasks: Vec<TaskSpec>,
    index: HashMap<TaskId, usize>,
    graph: DiGraph<TaskId, ()>,
    dependents: Vec<Vec<TaskId>>,
    depth: Vec<usize>,
    topo: Vec<usize>,
}

impl TaskGraph {
    /// Build and validate a graph from task specs plus an external dependency
    /// map (`task -> [depends on]`).
    ///
    /// Each task's own `dependencies` and the map entries are merged, keeping
    /// first-occurrence order and dropping duplicates.
    pub fn build(
        tasks: Vec<TaskSpec>,
        edges: &BTreeMap<TaskId, Vec<TaskId>>,
    ) -> Result<Self, ValidationError> {
        let mut index: HashMap<TaskId, usize> = HashMap::new();
        for (i, task) in tasks.iter().enumerate() {
            if index.insert(task.id.clone(), i).is_some() {
                return Err(ValidationError::DuplicateTask(task.id.clone()));
            }
        }

        for key in edges.keys() {
            if !index.contains_key(key) {
                return Err(ValidationError::UnknownTask(key.clone()));
            }
        }

        let mut tasks = tasks;
        for task in tasks.iter_mut() {
            let mut seen: HashSet<TaskId> = HashSet::new();
            let extra = edges.get(&task.id).cloned().unwrap_or_default();
            let merged: Vec<TaskId> = task
                .dependencies
                .drain(..)
                .chain(extra)
                .filter(|dep| seen.insert(dep.clone()))
                .collect();

            for dep in &merged {
                if !index.contains_key(dep) {
                    return Err(ValidationError::UnknownDependency {
                        task: task.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
            task.dependencies = merged;
        }

        let mut graph: DiGraph<TaskId, ()> = DiGraph::with_capacity(tasks.len(), tasks.len());
        for task in &tasks {
            graph.add_node(task.id.clone());
        }
        let mut dependents: Vec<Vec<TaskId>> = vec![Vec::new(); tasks.len()];
        for (i, task) in tasks.iter().enumerate() {
            for dep in &task.dependencies {
                let d = index[dep];
                graph.add_edge(NodeIndex::new(d), NodeIndex::new(i), ());
                dependents[d].push(task.id.clone());
            }
        }

        if let Some(cycle) = find_cycle(&graph) {
            return Err(ValidationError::Cycle(cycle));
        }

        let topo: Vec<usize> = toposort(&graph, None)
            .map_err(|cycle| ValidationError::Cycle(vec![graph[cycle.node_id()].clone()]))?
            .into_iter()
            .map(NodeIndex::index)
            .collect();

        let mut depth = vec![0usize; tasks.len()];
        for &i in &topo {
            depth[i] = tasks[i]
                .dependencies
                .iter()
                .map(|dep| depth[index[dep]] + 1)
                .max()
                .unwrap_or(0);
        }

        Ok(Self {
            tasks,
            index,
            graph,
            dependents,
            depth,
            topo,
        })
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Task specs in insertion order (dependencies already merged).
    pub fn tasks(&self) -> &[TaskSpec] {
        &self.tasks
    }

    pub fn task(&self, id: &str) -> Option<&TaskSpec> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    /// Insertion index, the final tie-breaker between equal priorities.
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Immediate dependencies of a task.
    pub fn dependencies_of(&self, id: &str) -> &[TaskId] {
        self.task(id)
            .map(|t| t.dependencies.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a task.
    pub fn dependents_of(&self, id: &str) -> &[TaskId] {
        self.index
            .get(id)
            .map(|&i| self.dependents[i].as_slice())
            .unwrap_or(&[])
    }

    /// Length of the longest dependency chain leading to this task.
    pub fn depth_of(&self, id: &str) -> usize {
        self.index.get(id).map(|&i| self.depth[i]).unwrap_or(0)
    }

    /// Tasks whose whole dependency set is contained in `completed` and for
    /// which `is_open` holds, in insertion order. The scheduler passes the
    /// ids that satisfy their dependents as `completed`.
    pub fn ready_set<F>(&self, completed: &HashSet<TaskId>, is_open: F) -> Vec<TaskId>
    where
        F: Fn(&str) -> bool,
    {
        self.tasks
            .iter()
            .filter(|t| is_open(&t.id))
            .filter(|t| t.dependencies.iter().all(|d| completed.contains(d)))
            .map(|t| t.id.clone())
            .collect()
    }

    /// A topological order, for display only. Execution never relies on it
    /// beyond the dependency constraint itself.
    pub fn topological_order(&self) -> Vec<&str> {
        self.topo.iter().map(|&i| self.tasks[i].id.as_str()).collect()
    }

    /// Number of dependency edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

/// Depth-first search keeping the current recursion stack; the first back
/// edge names the cycle, closed on its starting task.
fn find_cycle(graph: &DiGraph<TaskId, ()>) -> Option<Vec<TaskId>> {
    let mut stack: Vec<NodeIndex> = Vec::new();

    let result = depth_first_search(graph, graph.node_indices(), |event| {
        match event {
            DfsEvent::Discover(n, _) => stack.push(n),
            DfsEvent::Finish(_, _) => {
                stack.pop();
            }
            DfsEvent::BackEdge(_, to) => {
                if let Some(pos) = stack.iter().position(|&n| n == to) {
                    let mut cycle = stack[pos..].to_vec();
                    cycle.push(to);
                    return Control::Break(cycle);
                }
            }
            _ => {}
        }
        Control::Continue
    });

    result
        .break_value()
        .map(|cycle| cycle.into_iter().map(|n| graph[n].clone()).collect())
}
