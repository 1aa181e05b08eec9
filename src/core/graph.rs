//! Dependency graph validation
//!
//! Rules enforced, in order:
//! 1. Task IDs are unique.
//! 2. Every declared dependency names an existing task.
//! 3. The `dependency -> dependent` relation is acyclic.
//!
//! Validation is pure: the input is never mutated and no process is spawned.

use crate::core::{error::GraphError, pipeline::Task};
use std::collections::{HashMap, HashSet, VecDeque};

/// Validate a task set, discarding the ordering
pub fn validate(tasks: &[Task]) -> Result<(), GraphError> {
    topological_order(tasks).map(|_| ())
}

/// Validate a task set and return its IDs in dependency order
///
/// Ties are broken by definition order, so the result is deterministic.
pub fn topological_order(tasks: &[Task]) -> Result<Vec<String>, GraphError> {
    let mut known: HashSet<&str> = HashSet::with_capacity(tasks.len());
    for task in tasks {
        if !known.insert(task.id.as_str()) {
            return Err(GraphError::DuplicateTask(task.id.clone()));
        }
    }

    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> = tasks.iter().map(|t| (t.id.as_str(), 0)).collect();

    for task in tasks {
        for dep in &task.depends_on {
            if !known.contains(dep.as_str()) {
                return Err(GraphError::UnknownDependency {
                    task: task.id.clone(),
                    dependency: dep.clone(),
                });
            }
            dependents.entry(dep.as_str()).or_default().push(task.id.as_str());
            *in_degree.entry(task.id.as_str()).or_insert(0) += 1;
        }
    }

    // Kahn's algorithm
    let mut queue: VecDeque<&str> = tasks
        .iter()
        .map(|t| t.id.as_str())
        .filter(|id| in_degree[id] == 0)
        .collect();
    let mut order = Vec::with_capacity(tasks.len());

    while let Some(id) = queue.pop_front() {
        order.push(id.to_string());
        for &next in dependents.get(id).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(next) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(next);
                }
            }
        }
    }

    if order.len() != tasks.len() {
        let ordered: HashSet<&str> = order.iter().map(String::as_str).collect();
        let tasks = tasks
            .iter()
            .map(|t| t.id.clone())
            .filter(|id| !ordered.contains(id.as_str()))
            .collect();
        return Err(GraphError::CycleDetected { tasks });
    }

    Ok(order)
}
