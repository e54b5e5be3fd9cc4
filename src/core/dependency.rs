//! Opt-in diagnostics for the tick-task dependency graph.
//!
//! The scheduler never checks for cycles while dispatching; a cycle simply
//! leaves its tasks pending forever. These helpers let callers look for that
//! situation when they want to.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::core::{SchedulerError, TaskId, TickTaskHandle};

/// Ids of pending tasks that can never become eligible because they sit on,
/// or downstream of, a dependency cycle. Sorted ascending; empty if acyclic.
///
/// Only edges between tasks in `tasks` are considered. Dependencies outside
/// the set are already running, completed, or cancelled.
#[must_use]
pub fn find_cycles(tasks: &[TickTaskHandle]) -> Vec<TaskId> {
    let ids: HashSet<TaskId> = tasks.iter().map(|t| t.id()).collect();
    let mut in_degree: HashMap<TaskId, usize> = HashMap::with_capacity(tasks.len());
    let mut dependents: HashMap<TaskId, Vec<TaskId>> = HashMap::new();

    for task in tasks {
        let internal: Vec<TaskId> = task
            .dependency_ids()
            .into_iter()
            .filter(|dep| ids.contains(dep))
            .collect();
        in_degree.insert(task.id(), internal.len());
        for dep in internal {
            dependents.entry(dep).or_default().push(task.id());
        }
    }

    let mut ready: VecDeque<TaskId> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();

    while let Some(id) = ready.pop_front() {
        in_degree.remove(&id);
        for dependent in dependents.get(&id).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    ready.push_back(*dependent);
                }
            }
        }
    }

    let mut stuck: Vec<TaskId> = in_degree.into_keys().collect();
    stuck.sort_unstable();
    stuck
}

/// First pending task found waiting on a cancelled dependency.
#[must_use]
pub fn find_cancelled_dependency(tasks: &[TickTaskHandle]) -> Option<(TaskId, TaskId)> {
    tasks.iter().find_map(|task| {
        task.dependencies()
            .iter()
            .find(|dep| dep.is_cancelled())
            .map(|dep| (task.id(), dep.id()))
    })
}

/// Check pending tasks for cycles, then for cancelled dependencies.
///
/// # Errors
///
/// `SchedulerError::DependencyCycle` or `SchedulerError::CancelledDependency`.
pub fn validate(tasks: &[TickTaskHandle]) -> Result<(), SchedulerError> {
    let stuck = find_cycles(tasks);
    if !stuck.is_empty() {
        return Err(SchedulerError::DependencyCycle(stuck));
    }
    if let Some((task, dependency)) = find_cancelled_dependency(tasks) {
        return Err(SchedulerError::CancelledDependency { task, dependency });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TickTaskBuilder;
    use std::sync::Arc;

    fn node(id: TaskId) -> TickTaskHandle {
        Arc::new(TickTaskBuilder::new(0, || {}).build(id))
    }

    #[test]
    fn test_acyclic_chain() {
        let a = node(1);
        let b = node(2);
        let c = node(3);
        b.add_dependency(Arc::clone(&a));
        c.add_dependency(Arc::clone(&b));
        assert!(find_cycles(&[a, b, c]).is_empty());
    }

    #[test]
    fn test_cycle_and_downstream_reported() {
        let a = node(1);
        let b = node(2);
        let c = node(3);
        let free = node(4);
        a.add_dependency(Arc::clone(&b));
        b.add_dependency(Arc::clone(&a));
        c.add_dependency(Arc::clone(&b));
        let tasks = [a, b, c, free];
        assert_eq!(find_cycles(&tasks), vec![1, 2, 3]);
        assert_eq!(validate(&tasks), Err(SchedulerError::DependencyCycle(vec![1, 2, 3])));
    }

    #[test]
    fn test_cancelled_dependency_reported() {
        let a = node(1);
        let b = node(2);
        b.add_dependency(Arc::clone(&a));
        assert!(a.try_cancel());
        assert_eq!(
            validate(&[b]),
            Err(SchedulerError::CancelledDependency { task: 2, dependency: 1 })
        );
    }
}
