//! Task definitions and execution records

use crate::scheduler::retry::RetryConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Priority bands, highest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Critical,
    High,
    Normal,
    Low,
    Background,
}

impl TaskPriority {
    /// All bands in dequeue order
    pub const ALL: [TaskPriority; 5] = [
        TaskPriority::Critical,
        TaskPriority::High,
        TaskPriority::Normal,
        TaskPriority::Low,
        TaskPriority::Background,
    ];

    pub fn index(&self) -> usize {
        match self {
            TaskPriority::Critical => 0,
            TaskPriority::High => 1,
            TaskPriority::Normal => 2,
            TaskPriority::Low => 3,
            TaskPriority::Background => 4,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TaskPriority::Critical => "critical",
            TaskPriority::High => "high",
            TaskPriority::Normal => "normal",
            TaskPriority::Low => "low",
            TaskPriority::Background => "background",
        }
    }
}

/// Execution lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Queued,
    Running,
    Completed,
    Failed,
    Retrying,
    Cancelled,
    Skipped,
}

/// How a dependency is considered satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    /// Prior execution finished, regardless of outcome
    Completion,
    /// Prior execution completed successfully
    Success,
    /// Prior execution failed
    Failure,
}

/// A dependency on another task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDependency {
    pub task_id: String,
    pub kind: DependencyKind,
    /// Seconds to wait for the dependency, diagnostic only
    pub timeout_secs: Option<u64>,
}

impl TaskDependency {
    pub fn completion(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            kind: DependencyKind::Completion,
            timeout_secs: None,
        }
    }

    pub fn success(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            kind: DependencyKind::Success,
            timeout_secs: None,
        }
    }

    pub fn failure(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            kind: DependencyKind::Failure,
            timeout_secs: None,
        }
    }
}

/// A registered, schedulable task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub task_id: String,
    pub task_name: String,
    /// Resolved against the task registry at execution time
    pub function_path: String,
    pub priority: TaskPriority,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
    pub retry_config: Option<RetryConfig>,
    pub dependencies: Vec<TaskDependency>,
    pub require_lock: bool,
    pub lock_timeout_secs: u64,
    pub timeout_secs: Option<u64>,
    pub tags: Vec<String>,
}

impl TaskDefinition {
    pub fn new(
        task_id: impl Into<String>,
        task_name: impl Into<String>,
        function_path: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            task_name: task_name.into(),
            function_path: function_path.into(),
            priority: TaskPriority::Normal,
            args: Vec::new(),
            kwargs: Map::new(),
            retry_config: None,
            dependencies: Vec::new(),
            require_lock: false,
            lock_timeout_secs: 300,
            timeout_secs: None,
            tags: Vec::new(),
        }
    }

    pub fn priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry_config = Some(config);
        self
    }

    pub fn depends_on(mut self, dependency: TaskDependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn with_lock(mut self) -> Self {
        self.require_lock = true;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs());
        self
    }
}

/// One scheduled run of a task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecution {
    pub execution_id: Uuid,
    pub task_id: String,
    pub task_name: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub scheduled_time: DateTime<Utc>,
    pub started_time: Option<DateTime<Utc>>,
    pub completed_time: Option<DateTime<Utc>>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub lock_id: Option<String>,
    pub dependencies: Vec<TaskDependency>,
    pub metrics: HashMap<String, f64>,
}

impl TaskExecution {
    pub fn pending(definition: &TaskDefinition, scheduled_time: DateTime<Utc>) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            task_id: definition.task_id.clone(),
            task_name: definition.task_name.clone(),
            status: TaskStatus::Pending,
            priority: definition.priority,
            scheduled_time,
            started_time: None,
            completed_time: None,
            result: None,
            error: None,
            retry_count: 0,
            lock_id: None,
            dependencies: definition.dependencies.clone(),
            metrics: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(TaskPriority::Critical < TaskPriority::High);
        assert!(TaskPriority::High < TaskPriority::Background);
        assert_eq!(TaskPriority::ALL[0], TaskPriority::Critical);
    }

    #[test]
    fn test_definition_builder() {
        let definition = TaskDefinition::new("t1", "Nightly sync", "jobs.nightly_sync")
            .priority(TaskPriority::High)
            .with_lock()
            .depends_on(TaskDependency::success("t0"));
        assert_eq!(definition.priority, TaskPriority::High);
        assert!(definition.require_lock);
        assert_eq!(definition.dependencies.len(), 1);
        assert_eq!(definition.lock_timeout_secs, 300);
    }
}
