//! Task dependency DAG
//!
//! Forward and reverse adjacency maps; registration validates acyclicity with
//! a stack-based DFS and rolls back the partial insertion on cycle.

use crate::error::{CoreError, CoreResult};
use crate::scheduler::task::{DependencyKind, TaskDependency};
use std::collections::{HashMap, HashSet};

/// Dependency graph over task ids
#[derive(Default)]
pub struct TaskDependencyGraph {
    /// task -> the tasks it depends on
    graph: HashMap<String, HashSet<String>>,
    /// task -> the tasks depending on it
    reverse: HashMap<String, HashSet<String>>,
    /// (task, dependency) -> dependency kind
    metadata: HashMap<(String, String), DependencyKind>,
}

impl TaskDependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task and its dependencies; rejects insertions that would close a
    /// cycle, leaving the graph unchanged
    pub fn add_task(&mut self, task_id: &str, dependencies: &[TaskDependency]) -> CoreResult<()> {
        self.graph.entry(task_id.to_string()).or_default();

        for dependency in dependencies {
            self.graph
                .entry(task_id.to_string())
                .or_default()
                .insert(dependency.task_id.clone());
            self.reverse
                .entry(dependency.task_id.clone())
                .or_default()
                .insert(task_id.to_string());
            self.metadata
                .insert((task_id.to_string(), dependency.task_id.clone()), dependency.kind);
        }

        if self.has_cycle() {
            for dependency in dependencies {
                if let Some(edges) = self.graph.get_mut(task_id) {
                    edges.remove(&dependency.task_id);
                }
                if let Some(edges) = self.reverse.get_mut(&dependency.task_id) {
                    edges.remove(task_id);
                }
                self.metadata
                    .remove(&(task_id.to_string(), dependency.task_id.clone()));
            }
            return Err(CoreError::CircularDependency(task_id.to_string()));
        }

        Ok(())
    }

    /// Remove a task and every edge touching it
    pub fn remove_task(&mut self, task_id: &str) {
        if let Some(dependencies) = self.graph.remove(task_id) {
            for dependency in dependencies {
                if let Some(edges) = self.reverse.get_mut(&dependency) {
                    edges.remove(task_id);
                }
                self.metadata.remove(&(task_id.to_string(), dependency));
            }
        }
        if let Some(dependents) = self.reverse.remove(task_id) {
            for dependent in dependents {
                if let Some(edges) = self.graph.get_mut(&dependent) {
                    edges.remove(task_id);
                }
                self.metadata.remove(&(dependent, task_id.to_string()));
            }
        }
    }

    /// Stack-based DFS with an explicit recursion stack
    pub fn has_cycle(&self) -> bool {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut on_stack: HashSet<&str> = HashSet::new();

        for start in self.graph.keys() {
            if visited.contains(start.as_str()) {
                continue;
            }
            // (node, neighbor iterator position) frames
            let mut stack: Vec<(&str, Vec<&str>)> = vec![(
                start.as_str(),
                self.neighbors(start),
            )];
            on_stack.insert(start.as_str());
            visited.insert(start.as_str());

            while !stack.is_empty() {
                let next = stack.last_mut().and_then(|(_, neighbors)| neighbors.pop());
                match next {
                    Some(next) => {
                        if on_stack.contains(next) {
                            return true;
                        }
                        if !visited.contains(next) {
                            visited.insert(next);
                            on_stack.insert(next);
                            stack.push((next, self.neighbors(next)));
                        }
                    }
                    None => {
                        if let Some((node, _)) = stack.pop() {
                            on_stack.remove(node);
                        }
                    }
                }
            }
        }
        false
    }

    fn neighbors(&self, node: &str) -> Vec<&str> {
        self.graph
            .get(node)
            .map(|edges| edges.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Direct dependencies of a task
    pub fn dependencies_of(&self, task_id: &str) -> HashSet<String> {
        self.graph.get(task_id).cloned().unwrap_or_default()
    }

    /// Tasks that depend on this task
    pub fn dependents_of(&self, task_id: &str) -> HashSet<String> {
        self.reverse.get(task_id).cloned().unwrap_or_default()
    }

    /// Execution order (dependencies before dependents)
    pub fn topological_sort(&self) -> CoreResult<Vec<String>> {
        if self.has_cycle() {
            return Err(CoreError::CircularDependency(
                "dependency graph".to_string(),
            ));
        }

        let mut visited: HashSet<String> = HashSet::new();
        let mut order: Vec<String> = Vec::new();

        let mut nodes: Vec<&String> = self.graph.keys().collect();
        nodes.sort();
        for start in nodes {
            if visited.contains(start) {
                continue;
            }
            // Post-order DFS, iterative
            let mut stack: Vec<(String, bool)> = vec![(start.clone(), false)];
            while let Some((node, expanded)) = stack.pop() {
                if expanded {
                    order.push(node);
                    continue;
                }
                if visited.contains(&node) {
                    continue;
                }
                visited.insert(node.clone());
                stack.push((node.clone(), true));
                let mut next: Vec<String> =
                    self.dependencies_of(&node).into_iter().collect();
                next.sort();
                for neighbor in next {
                    if !visited.contains(&neighbor) {
                        stack.push((neighbor, false));
                    }
                }
            }
        }

        Ok(order)
    }

    /// Topological traversal filtered to tasks whose dependencies are all in
    /// `completed`
    pub fn ready_tasks(&self, completed: &HashSet<String>) -> CoreResult<Vec<String>> {
        let order = self.topological_sort()?;
        Ok(order
            .into_iter()
            .filter(|task_id| !completed.contains(task_id))
            .filter(|task_id| {
                self.dependencies_of(task_id)
                    .iter()
                    .all(|dependency| completed.contains(dependency))
            })
            .collect())
    }
}
