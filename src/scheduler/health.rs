//! Scheduler health monitoring

use crate::constants::ERROR_LOG_LIMIT;
use crate::scheduler::task::{TaskExecution, TaskStatus};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Counter set tracked by the monitor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthMetrics {
    pub tasks_executed: u64,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
    pub tasks_retried: u64,
    pub tasks_cancelled: u64,
    pub total_execution_time: f64,
    pub lock_acquisitions: u64,
    pub lock_failures: u64,
}

/// One retained failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub timestamp: DateTime<Utc>,
    pub task_id: String,
    pub task_name: String,
    pub error: Option<String>,
    pub retry_count: u32,
}

/// Point-in-time health summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// "healthy" at >= 90% success, else "degraded"
    pub status: String,
    pub uptime_seconds: f64,
    pub metrics: HealthMetrics,
    pub success_rate: f64,
    pub average_execution_time: f64,
    pub lock_success_rate: f64,
    pub recent_errors: Vec<ErrorEntry>,
}

struct MonitorState {
    start_time: DateTime<Utc>,
    metrics: HealthMetrics,
    error_log: Vec<ErrorEntry>,
}

/// Tracks execution statistics and the last hundred errors
pub struct SchedulerHealthMonitor {
    state: Mutex<MonitorState>,
}

impl Default for SchedulerHealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerHealthMonitor {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MonitorState {
                start_time: Utc::now(),
                metrics: HealthMetrics::default(),
                error_log: Vec::new(),
            }),
        }
    }

    /// Record a finished execution
    pub fn record_execution(&self, execution: &TaskExecution, execution_time_secs: f64) {
        let mut state = self.state.lock();
        state.metrics.tasks_executed += 1;
        state.metrics.total_execution_time += execution_time_secs;

        match execution.status {
            TaskStatus::Completed => state.metrics.tasks_succeeded += 1,
            TaskStatus::Failed => {
                state.metrics.tasks_failed += 1;
                state.error_log.push(ErrorEntry {
                    timestamp: Utc::now(),
                    task_id: execution.task_id.clone(),
                    task_name: execution.task_name.clone(),
                    error: execution.error.clone(),
                    retry_count: execution.retry_count,
                });
                let overflow = state.error_log.len().saturating_sub(ERROR_LOG_LIMIT);
                if overflow > 0 {
                    state.error_log.drain(..overflow);
                }
            }
            TaskStatus::Retrying => state.metrics.tasks_retried += 1,
            TaskStatus::Cancelled => state.metrics.tasks_cancelled += 1,
            _ => {}
        }
    }

    /// Record a lock acquisition attempt
    pub fn record_lock_acquisition(&self, success: bool) {
        let mut state = self.state.lock();
        if success {
            state.metrics.lock_acquisitions += 1;
        } else {
            state.metrics.lock_failures += 1;
        }
    }

    /// Current health summary
    pub fn health_status(&self) -> HealthStatus {
        let state = self.state.lock();
        let total = state.metrics.tasks_executed;
        let success_rate = if total > 0 {
            state.metrics.tasks_succeeded as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        let average_execution_time = if total > 0 {
            state.metrics.total_execution_time / total as f64
        } else {
            0.0
        };
        let lock_attempts = state.metrics.lock_acquisitions + state.metrics.lock_failures;
        let lock_success_rate = if lock_attempts > 0 {
            state.metrics.lock_acquisitions as f64 / lock_attempts as f64 * 100.0
        } else {
            0.0
        };
        let status = if total == 0 || success_rate >= 90.0 {
            "healthy"
        } else {
            "degraded"
        };
        let recent_errors = state
            .error_log
            .iter()
            .rev()
            .take(10)
            .rev()
            .cloned()
            .collect();

        HealthStatus {
            status: status.to_string(),
            uptime_seconds: (Utc::now() - state.start_time).num_milliseconds() as f64 / 1000.0,
            metrics: state.metrics.clone(),
            success_rate: round2(success_rate),
            average_execution_time: round2(average_execution_time),
            lock_success_rate: round2(lock_success_rate),
            recent_errors,
        }
    }

    /// Reset counters and the error log
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.start_time = Utc::now();
        state.metrics = HealthMetrics::default();
        state.error_log.clear();
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::task::TaskDefinition;

    fn finished(status: TaskStatus, error: Option<&str>) -> TaskExecution {
        let definition = TaskDefinition::new("t", "task", "noop");
        let mut execution = TaskExecution::pending(&definition, Utc::now());
        execution.status = status;
        execution.error = error.map(String::from);
        execution
    }

    #[test]
    fn test_success_rate_and_status() {
        let monitor = SchedulerHealthMonitor::new();
        for _ in 0..9 {
            monitor.record_execution(&finished(TaskStatus::Completed, None), 0.1);
        }
        monitor.record_execution(&finished(TaskStatus::Failed, Some("boom")), 0.1);

        let status = monitor.health_status();
        assert_eq!(status.status, "healthy");
        assert_eq!(status.success_rate, 90.0);
        assert_eq!(status.recent_errors.len(), 1);

        monitor.record_execution(&finished(TaskStatus::Failed, Some("again")), 0.1);
        assert_eq!(monitor.health_status().status, "degraded");
    }

    #[test]
    fn test_error_log_bounded() {
        let monitor = SchedulerHealthMonitor::new();
        for i in 0..150 {
            monitor.record_execution(
                &finished(TaskStatus::Failed, Some(&format!("error {}", i))),
                0.0,
            );
        }
        let status = monitor.health_status();
        assert_eq!(status.metrics.tasks_failed, 150);
        assert_eq!(status.recent_errors.len(), 10);
        assert_eq!(
            status.recent_errors.last().unwrap().error.as_deref(),
            Some("error 149")
        );
    }

    #[test]
    fn test_lock_rates() {
        let monitor = SchedulerHealthMonitor::new();
        monitor.record_lock_acquisition(true);
        monitor.record_lock_acquisition(true);
        monitor.record_lock_acquisition(false);
        let status = monitor.health_status();
        assert!((status.lock_success_rate - 66.67).abs() < 0.01);
    }
}
