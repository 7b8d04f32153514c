//! Priority task queue
//!
//! Five bands with strict priority across bands and FIFO within a band.
//! A task_id index supports cancellation of queued work.

use crate::scheduler::task::{TaskExecution, TaskPriority};
use std::collections::{HashMap, VecDeque};
use tracing::debug;
use uuid::Uuid;

/// FIFO-per-band priority queue
#[derive(Default)]
pub struct PriorityTaskQueue {
    bands: [VecDeque<TaskExecution>; 5],
    /// task_id -> most recently enqueued execution id
    index: HashMap<String, Uuid>,
}

impl PriorityTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail of the task's priority band
    pub fn enqueue(&mut self, execution: TaskExecution) {
        debug!(task = %execution.task_name, priority = execution.priority.name(), "enqueued");
        self.index
            .insert(execution.task_id.clone(), execution.execution_id);
        self.bands[execution.priority.index()].push_back(execution);
    }

    /// Remove and return the highest-priority task
    pub fn dequeue(&mut self) -> Option<TaskExecution> {
        for band in &mut self.bands {
            if let Some(execution) = band.pop_front() {
                if self.index.get(&execution.task_id) == Some(&execution.execution_id) {
                    self.index.remove(&execution.task_id);
                }
                return Some(execution);
            }
        }
        None
    }

    /// Highest-priority task without removing it
    pub fn peek(&self) -> Option<&TaskExecution> {
        self.bands.iter().find_map(|band| band.front())
    }

    /// Remove a queued task by task_id
    pub fn remove(&mut self, task_id: &str) -> bool {
        let Some(execution_id) = self.index.remove(task_id) else {
            return false;
        };
        for band in &mut self.bands {
            if let Some(position) = band.iter().position(|e| e.execution_id == execution_id) {
                band.remove(position);
                return true;
            }
        }
        false
    }

    /// Remove a queued execution by its id
    pub fn remove_execution(&mut self, execution_id: Uuid) -> bool {
        for band in &mut self.bands {
            if let Some(position) = band.iter().position(|e| e.execution_id == execution_id) {
                let removed = band.remove(position);
                if let Some(execution) = removed {
                    if self.index.get(&execution.task_id) == Some(&execution.execution_id) {
                        self.index.remove(&execution.task_id);
                    }
                }
                return true;
            }
        }
        false
    }

    /// Find a queued execution by id
    pub fn find(&self, execution_id: Uuid) -> Option<&TaskExecution> {
        self.bands
            .iter()
            .find_map(|band| band.iter().find(|e| e.execution_id == execution_id))
    }

    /// Queue length, optionally for a single band
    pub fn size(&self, priority: Option<TaskPriority>) -> usize {
        match priority {
            Some(priority) => self.bands[priority.index()].len(),
            None => self.bands.iter().map(VecDeque::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size(None) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::task::TaskDefinition;
    use chrono::Utc;

    fn execution(task_id: &str, priority: TaskPriority) -> TaskExecution {
        let definition = TaskDefinition::new(task_id, task_id, "noop").priority(priority);
        TaskExecution::pending(&definition, Utc::now())
    }

    #[test]
    fn test_strict_priority_then_fifo() {
        let mut queue = PriorityTaskQueue::new();
        queue.enqueue(execution("low-1", TaskPriority::Low));
        queue.enqueue(execution("normal-1", TaskPriority::Normal));
        queue.enqueue(execution("critical-1", TaskPriority::Critical));
        queue.enqueue(execution("normal-2", TaskPriority::Normal));

        assert_eq!(queue.dequeue().unwrap().task_id, "critical-1");
        assert_eq!(queue.dequeue().unwrap().task_id, "normal-1");
        assert_eq!(queue.dequeue().unwrap().task_id, "normal-2");
        assert_eq!(queue.dequeue().unwrap().task_id, "low-1");
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn test_remove_by_task_id() {
        let mut queue = PriorityTaskQueue::new();
        queue.enqueue(execution("a", TaskPriority::Normal));
        queue.enqueue(execution("b", TaskPriority::Normal));
        assert!(queue.remove("a"));
        assert!(!queue.remove("a"));
        assert_eq!(queue.size(None), 1);
        assert_eq!(queue.dequeue().unwrap().task_id, "b");
    }

    #[test]
    fn test_peek_does_not_remove() {
        let mut queue = PriorityTaskQueue::new();
        queue.enqueue(execution("a", TaskPriority::High));
        assert_eq!(queue.peek().unwrap().task_id, "a");
        assert_eq!(queue.size(Some(TaskPriority::High)), 1);
    }
}
