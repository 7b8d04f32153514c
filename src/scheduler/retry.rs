//! Retry strategies with backoff and jitter

use crate::scheduler::task::TaskExecution;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Backoff strategy for failed tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    None,
    Fixed,
    Linear,
    Exponential,
}

/// Retry behavior for a task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub strategy: RetryStrategy,
    pub max_attempts: u32,
    pub initial_delay_secs: u64,
    pub max_delay_secs: u64,
    pub backoff_multiplier: f64,
    /// ±20% random variation to avoid thundering herds
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            strategy: RetryStrategy::Exponential,
            max_attempts: 3,
            initial_delay_secs: 60,
            max_delay_secs: 3600,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn exponential(initial_delay_secs: u64, multiplier: f64, max_delay_secs: u64) -> Self {
        Self {
            strategy: RetryStrategy::Exponential,
            initial_delay_secs,
            backoff_multiplier: multiplier,
            max_delay_secs,
            ..Self::default()
        }
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }
}

/// Decides whether and when failed tasks retry.
///
/// The per-task attempt timestamps are diagnostic only; nothing reads them
/// back for scheduling decisions.
#[derive(Default)]
pub struct TaskRetryManager {
    history: Mutex<HashMap<String, Vec<DateTime<Utc>>>>,
}

impl TaskRetryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a failed execution should be retried
    pub fn should_retry(&self, execution: &TaskExecution, config: &RetryConfig) -> bool {
        if config.strategy == RetryStrategy::None {
            return false;
        }
        execution.retry_count < config.max_attempts
    }

    /// Delay before the next attempt
    pub fn calculate_delay(&self, execution: &TaskExecution, config: &RetryConfig) -> Duration {
        let attempt = execution.retry_count;
        let base = match config.strategy {
            RetryStrategy::Fixed | RetryStrategy::None => config.initial_delay_secs as f64,
            RetryStrategy::Linear => config.initial_delay_secs as f64 * (attempt + 1) as f64,
            RetryStrategy::Exponential => {
                config.initial_delay_secs as f64 * config.backoff_multiplier.powi(attempt as i32)
            }
        };

        let mut delay = base.min(config.max_delay_secs as f64);
        if config.jitter {
            let factor = rand::thread_rng().gen_range(0.8..=1.2);
            delay *= factor;
        }
        Duration::from_secs_f64(delay.max(0.0))
    }

    /// Record an attempt timestamp
    pub fn record_retry(&self, task_id: &str) {
        self.history
            .lock()
            .entry(task_id.to_string())
            .or_default()
            .push(Utc::now());
    }

    /// Number of recorded attempts for a task
    pub fn retry_count(&self, task_id: &str) -> usize {
        self.history.lock().get(task_id).map_or(0, Vec::len)
    }

    /// Drop a task's attempt history
    pub fn clear_history(&self, task_id: &str) {
        self.history.lock().remove(task_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::task::{TaskDefinition, TaskExecution};
    use test_case::test_case;

    fn execution_with_retries(retry_count: u32) -> TaskExecution {
        let definition = TaskDefinition::new("t", "t", "noop");
        let mut execution = TaskExecution::pending(&definition, Utc::now());
        execution.retry_count = retry_count;
        execution
    }

    #[test_case(0, 1 ; "first attempt waits initial delay")]
    #[test_case(1, 2 ; "second attempt doubles")]
    #[test_case(2, 4 ; "third attempt doubles again")]
    #[test_case(3, 8 ; "fourth attempt doubles once more")]
    fn test_exponential_backoff(attempt: u32, expected_secs: u64) {
        let manager = TaskRetryManager::new();
        let config = RetryConfig::exponential(1, 2.0, 60).without_jitter();
        let delay = manager.calculate_delay(&execution_with_retries(attempt), &config);
        assert_eq!(delay, Duration::from_secs(expected_secs));
    }

    #[test]
    fn test_max_delay_clamp() {
        let manager = TaskRetryManager::new();
        let config = RetryConfig::exponential(60, 2.0, 120).without_jitter();
        let delay = manager.calculate_delay(&execution_with_retries(10), &config);
        assert_eq!(delay, Duration::from_secs(120));
    }

    #[test]
    fn test_linear_backoff() {
        let manager = TaskRetryManager::new();
        let config = RetryConfig {
            strategy: RetryStrategy::Linear,
            initial_delay_secs: 10,
            jitter: false,
            ..RetryConfig::default()
        };
        assert_eq!(
            manager.calculate_delay(&execution_with_retries(2), &config),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_jitter_bounds() {
        let manager = TaskRetryManager::new();
        let config = RetryConfig::exponential(10, 2.0, 3600);
        for _ in 0..100 {
            let delay = manager.calculate_delay(&execution_with_retries(0), &config);
            assert!(delay >= Duration::from_secs_f64(8.0));
            assert!(delay <= Duration::from_secs_f64(12.0));
        }
    }

    #[test]
    fn test_should_retry_respects_limits() {
        let manager = TaskRetryManager::new();
        let config = RetryConfig::default().max_attempts(4);
        assert!(manager.should_retry(&execution_with_retries(3), &config));
        assert!(!manager.should_retry(&execution_with_retries(4), &config));

        let no_retry = RetryConfig {
            strategy: RetryStrategy::None,
            ..RetryConfig::default()
        };
        assert!(!manager.should_retry(&execution_with_retries(0), &no_retry));
    }

    #[test]
    fn test_history_is_diagnostic() {
        let manager = TaskRetryManager::new();
        manager.record_retry("t1");
        manager.record_retry("t1");
        assert_eq!(manager.retry_count("t1"), 2);
        manager.clear_history("t1");
        assert_eq!(manager.retry_count("t1"), 0);
    }
}
