//! Per-worker double-ended task queue.
//!
//! The owning worker pushes and pops at the head (LIFO, recently submitted
//! work stays hot in cache). Thieves take from the tail so they disturb the
//! least recently pushed item and rarely meet the owner at the same end.

use std::collections::VecDeque;

use parking_lot::RwLock;

use crate::core::Task;

/// Double-ended queue of tasks owned by one worker.
#[derive(Debug, Default)]
pub struct WorkerQueue {
    tasks: RwLock<VecDeque<Task>>,
}

impl WorkerQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert at the head.
    pub fn push(&self, task: Task) {
        self.tasks.write().push_front(task);
    }

    /// Remove from the head (owner side).
    pub fn try_pop(&self) -> Option<Task> {
        self.tasks.write().pop_front()
    }

    /// Remove from the tail (thief side).
    pub fn try_steal(&self) -> Option<Task> {
        self.tasks.write().pop_back()
    }

    /// Number of queued tasks.
    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    /// Whether the queue holds no tasks.
    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }

    /// Remove and return every queued task, head first.
    pub fn drain(&self) -> Vec<Task> {
        self.tasks.write().drain(..).collect()
    }
}
