//! Advanced task scheduler
//!
//! Priority queues, DAG dependencies, distributed locking, retry with
//! backoff, and health monitoring around a single cooperative executor loop.
//! Task bodies run as spawned executions so blocking work never stalls the
//! loop; a running task is never preempted.

pub mod graph;
pub mod health;
pub mod lock;
pub mod queue;
pub mod registry;
pub mod retry;
pub mod task;

pub use graph::TaskDependencyGraph;
pub use health::{HealthStatus, SchedulerHealthMonitor};
pub use lock::{DistributedTaskLock, LockGuard};
pub use queue::PriorityTaskQueue;
pub use registry::{TaskContext, TaskHandler, TaskRegistry};
pub use retry::{RetryConfig, RetryStrategy, TaskRetryManager};
pub use task::{
    DependencyKind, TaskDefinition, TaskDependency, TaskExecution, TaskPriority, TaskStatus,
};

use crate::config::SchedulerConfig;
use crate::constants::TASK_HISTORY_LIMIT;
use crate::error::{CoreError, CoreResult};
use crate::store::KeyValueStore;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use cron::Schedule;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Queue depth by band, reported with health
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub total_queued: usize,
    pub by_priority: HashMap<String, usize>,
}

/// Health summary including queue and concurrency state
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    #[serde(flatten)]
    pub health: HealthStatus,
    pub queue_stats: QueueStats,
    pub running_tasks: usize,
    pub max_concurrent_tasks: usize,
}

struct CronEntry {
    schedule: Schedule,
    end_time: Option<DateTime<Utc>>,
}

/// The scheduler: registration, queuing, and the executor loop
pub struct TaskScheduler {
    config: SchedulerConfig,
    registry: Arc<TaskRegistry>,
    queue: Mutex<PriorityTaskQueue>,
    graph: Mutex<TaskDependencyGraph>,
    lock_manager: DistributedTaskLock,
    retry_manager: TaskRetryManager,
    health_monitor: SchedulerHealthMonitor,
    definitions: DashMap<String, TaskDefinition>,
    running_tasks: DashMap<String, TaskExecution>,
    cancel_flags: DashMap<Uuid, Arc<AtomicBool>>,
    cron_entries: DashMap<String, CronEntry>,
    history: Mutex<VecDeque<TaskExecution>>,
    running: AtomicBool,
    executor: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl TaskScheduler {
    pub fn new(
        config: SchedulerConfig,
        registry: Arc<TaskRegistry>,
        kv: Arc<dyn KeyValueStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            registry,
            queue: Mutex::new(PriorityTaskQueue::new()),
            graph: Mutex::new(TaskDependencyGraph::new()),
            lock_manager: DistributedTaskLock::new(kv),
            retry_manager: TaskRetryManager::new(),
            health_monitor: SchedulerHealthMonitor::new(),
            definitions: DashMap::new(),
            running_tasks: DashMap::new(),
            cancel_flags: DashMap::new(),
            cron_entries: DashMap::new(),
            history: Mutex::new(VecDeque::new()),
            running: AtomicBool::new(false),
            executor: tokio::sync::Mutex::new(None),
        })
    }

    /// Register a task definition, validating its dependency edges
    pub fn register_task(&self, definition: TaskDefinition) -> CoreResult<()> {
        if self.definitions.contains_key(&definition.task_id) {
            return Err(CoreError::Conflict(format!(
                "task {} already registered",
                definition.task_id
            )));
        }
        self.graph
            .lock()
            .add_task(&definition.task_id, &definition.dependencies)?;
        info!(task = %definition.task_name, id = %definition.task_id, "registered task");
        self.definitions
            .insert(definition.task_id.clone(), definition);
        Ok(())
    }

    /// Unregister a task; returns false when unknown
    pub fn unregister_task(&self, task_id: &str) -> bool {
        if self.definitions.remove(task_id).is_none() {
            return false;
        }
        self.graph.lock().remove_task(task_id);
        self.cron_entries.remove(task_id);
        info!(task_id, "unregistered task");
        true
    }

    /// Queue one execution of a registered task
    pub fn schedule_task(
        &self,
        task_id: &str,
        scheduled_time: Option<DateTime<Utc>>,
    ) -> CoreResult<Uuid> {
        let definition = self
            .definitions
            .get(task_id)
            .ok_or_else(|| CoreError::UnknownTask(task_id.to_string()))?;
        let execution =
            TaskExecution::pending(&definition, scheduled_time.unwrap_or_else(Utc::now));
        let execution_id = execution.execution_id;
        self.queue.lock().enqueue(execution);
        info!(task = %definition.task_name, %execution_id, "scheduled task");
        Ok(execution_id)
    }

    /// Schedule the next cron occurrence inside the window. Expansion is
    /// lazy: each call queues only one occurrence, and completion of that
    /// occurrence queues the next.
    pub fn schedule_cron_task(
        &self,
        task_id: &str,
        cron_expression: &str,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
    ) -> CoreResult<Vec<Uuid>> {
        if !self.definitions.contains_key(task_id) {
            return Err(CoreError::UnknownTask(task_id.to_string()));
        }
        let schedule = parse_cron(cron_expression)?;
        let after = start_time.unwrap_or_else(Utc::now);
        let Some(next_run) = schedule.after(&after).next() else {
            return Ok(Vec::new());
        };
        if let Some(end) = end_time {
            if next_run > end {
                return Ok(Vec::new());
            }
        }

        self.cron_entries
            .insert(task_id.to_string(), CronEntry { schedule, end_time });
        let execution_id = self.schedule_task(task_id, Some(next_run))?;
        info!(task_id, cron = cron_expression, %next_run, "scheduled cron task");
        Ok(vec![execution_id])
    }

    /// Next occurrence a cron expression would produce after `after`
    pub fn cron_next_occurrence(
        cron_expression: &str,
        after: DateTime<Utc>,
    ) -> CoreResult<Option<DateTime<Utc>>> {
        Ok(parse_cron(cron_expression)?.after(&after).next())
    }

    /// Cancel a queued or running execution.
    ///
    /// Queued executions are removed immediately. Running executions are
    /// flagged; the function observes the flag cooperatively and is never
    /// forcibly killed.
    pub fn cancel_task(&self, execution_id: Uuid) -> bool {
        if self.queue.lock().remove_execution(execution_id) {
            info!(%execution_id, "cancelled queued task");
            return true;
        }
        if let Some(flag) = self.cancel_flags.get(&execution_id) {
            flag.store(true, Ordering::SeqCst);
            for mut entry in self.running_tasks.iter_mut() {
                if entry.execution_id == execution_id {
                    entry.status = TaskStatus::Cancelled;
                }
            }
            warn!(%execution_id, "marked running task for cancellation");
            return true;
        }
        false
    }

    /// Start the executor loop
    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("scheduler already running");
            return;
        }
        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move {
            scheduler.executor_loop().await;
        });
        *self.executor.lock().await = Some(handle);
        info!("task scheduler started");
    }

    /// Stop the executor loop, optionally waiting for it to wind down
    pub async fn stop(&self, wait: bool) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if wait {
            if let Some(handle) = self.executor.lock().await.take() {
                let _ = handle.await;
            }
        }
        info!("task scheduler stopped");
    }

    async fn executor_loop(self: Arc<Self>) {
        while self.running.load(Ordering::SeqCst) {
            // Over the concurrency cap: yield briefly and retry
            if self.running_tasks.len() >= self.config.max_concurrent_tasks {
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }

            let Some(execution) = self.queue.lock().dequeue() else {
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            };

            // Not due yet: put it back and yield
            if execution.scheduled_time > Utc::now() {
                self.queue.lock().enqueue(execution);
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }

            // Dependencies unsatisfied: put it back and yield
            if !self.dependencies_satisfied(&execution) {
                self.queue.lock().enqueue(execution);
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }

            let scheduler = Arc::clone(&self);
            self.running_tasks
                .insert(execution.task_id.clone(), execution.clone());
            tokio::spawn(async move {
                scheduler.execute(execution).await;
            });
        }
    }

    /// Dependency satisfaction against the bounded execution history
    fn dependencies_satisfied(&self, execution: &TaskExecution) -> bool {
        if execution.dependencies.is_empty() {
            return true;
        }
        let history = self.history.lock();
        execution.dependencies.iter().all(|dependency| {
            history
                .iter()
                .filter(|prior| prior.task_id == dependency.task_id)
                .any(|prior| match dependency.kind {
                    DependencyKind::Completion => matches!(
                        prior.status,
                        TaskStatus::Completed | TaskStatus::Failed
                    ),
                    DependencyKind::Success => prior.status == TaskStatus::Completed,
                    DependencyKind::Failure => prior.status == TaskStatus::Failed,
                })
        })
    }

    async fn execute(self: Arc<Self>, mut execution: TaskExecution) {
        let Some(definition) = self.definitions.get(&execution.task_id).map(|d| d.value().clone()) else {
            self.running_tasks.remove(&execution.task_id);
            return;
        };

        let started = std::time::Instant::now();
        execution.status = TaskStatus::Running;
        execution.started_time = Some(Utc::now());
        let cancel_flag = Arc::new(AtomicBool::new(false));
        self.cancel_flags
            .insert(execution.execution_id, cancel_flag.clone());
        self.running_tasks
            .insert(execution.task_id.clone(), execution.clone());

        // Lock guard lives for the whole execution; Drop releases it on every
        // exit path.
        let mut guard: Option<LockGuard> = None;
        let outcome: CoreResult<serde_json::Value> = async {
            if definition.require_lock {
                let acquired = self
                    .lock_manager
                    .acquire(
                        &execution.task_id,
                        Duration::from_secs(definition.lock_timeout_secs),
                        Duration::from_millis(self.config.lock_retry_delay_ms),
                        Duration::from_secs(self.config.lock_max_wait_secs),
                    )
                    .await;
                match acquired {
                    Some(lock) => {
                        execution.lock_id = Some(lock.lock_id().to_string());
                        self.health_monitor.record_lock_acquisition(true);
                        guard = Some(lock);
                    }
                    None => {
                        self.health_monitor.record_lock_acquisition(false);
                        return Err(CoreError::LockUnavailable(execution.task_id.clone()));
                    }
                }
            }

            let handler = self.registry.resolve(&definition.function_path)?;
            let context = TaskContext::new(
                definition.args.clone(),
                definition.kwargs.clone(),
                cancel_flag.clone(),
            );

            match definition.timeout_secs {
                Some(timeout_secs) => {
                    tokio::time::timeout(Duration::from_secs(timeout_secs), handler(context))
                        .await
                        .map_err(|_| CoreError::Timeout)?
                }
                None => handler(context).await,
            }
        }
        .await;

        execution.completed_time = Some(Utc::now());
        match outcome {
            Ok(result) => {
                if cancel_flag.load(Ordering::SeqCst) {
                    execution.status = TaskStatus::Cancelled;
                } else {
                    execution.status = TaskStatus::Completed;
                    execution.result = Some(result);
                    info!(task = %execution.task_name, "task completed");
                }
            }
            Err(err) => {
                execution.status = TaskStatus::Failed;
                execution.error = Some(err.to_string());
                error!(task = %execution.task_name, error = %err, "task failed");

                if let Some(retry_config) = &definition.retry_config {
                    if self.retry_manager.should_retry(&execution, retry_config) {
                        let delay = self.retry_manager.calculate_delay(&execution, retry_config);
                        execution.status = TaskStatus::Retrying;
                        execution.retry_count += 1;

                        let mut retry = TaskExecution::pending(
                            &definition,
                            Utc::now() + ChronoDuration::milliseconds(delay.as_millis() as i64),
                        );
                        retry.retry_count = execution.retry_count;
                        self.queue.lock().enqueue(retry);
                        self.retry_manager.record_retry(&execution.task_id);
                        info!(
                            task = %execution.task_name,
                            retry = execution.retry_count,
                            delay_ms = delay.as_millis() as u64,
                            "scheduled retry"
                        );
                    }
                }
            }
        }

        // Scoped release on every exit
        drop(guard);

        let execution_time = started.elapsed().as_secs_f64();
        execution
            .metrics
            .insert("execution_time".to_string(), execution_time);
        self.health_monitor.record_execution(&execution, execution_time);

        // Completed cron tasks queue their next occurrence
        if execution.status == TaskStatus::Completed {
            self.schedule_next_cron_occurrence(&execution.task_id);
        }

        self.running_tasks.remove(&execution.task_id);
        self.cancel_flags.remove(&execution.execution_id);

        let mut history = self.history.lock();
        history.push_back(execution);
        while history.len() > TASK_HISTORY_LIMIT {
            history.pop_front();
        }
    }

    fn schedule_next_cron_occurrence(&self, task_id: &str) {
        let Some(entry) = self.cron_entries.get(task_id) else {
            return;
        };
        let Some(next_run) = entry.schedule.after(&Utc::now()).next() else {
            return;
        };
        if let Some(end) = entry.end_time {
            if next_run > end {
                return;
            }
        }
        drop(entry);
        if let Err(err) = self.schedule_task(task_id, Some(next_run)) {
            warn!(task_id, error = %err, "failed to queue next cron occurrence");
        }
    }

    /// Health summary plus queue and concurrency statistics
    pub fn health_status(&self) -> SchedulerStatus {
        let queue = self.queue.lock();
        let by_priority = TaskPriority::ALL
            .iter()
            .map(|priority| (priority.name().to_string(), queue.size(Some(*priority))))
            .collect();
        SchedulerStatus {
            health: self.health_monitor.health_status(),
            queue_stats: QueueStats {
                total_queued: queue.size(None),
                by_priority,
            },
            running_tasks: self.running_tasks.len(),
            max_concurrent_tasks: self.config.max_concurrent_tasks,
        }
    }

    /// Status of one execution, wherever it currently lives
    pub fn task_status(&self, execution_id: Uuid) -> Option<TaskExecution> {
        for entry in self.running_tasks.iter() {
            if entry.execution_id == execution_id {
                return Some(entry.clone());
            }
        }
        if let Some(found) = self
            .history
            .lock()
            .iter()
            .find(|e| e.execution_id == execution_id)
        {
            return Some(found.clone());
        }
        self.queue.lock().find(execution_id).cloned()
    }

    /// Executions retained in history for a task, oldest first
    pub fn history_for(&self, task_id: &str) -> Vec<TaskExecution> {
        self.history
            .lock()
            .iter()
            .filter(|e| e.task_id == task_id)
            .cloned()
            .collect()
    }

    pub fn lock_manager(&self) -> &DistributedTaskLock {
        &self.lock_manager
    }

    pub fn retry_manager(&self) -> &TaskRetryManager {
        &self.retry_manager
    }
}

/// Parse a cron expression, accepting the common 5-field form by
/// prepending a seconds field
fn parse_cron(expression: &str) -> CoreResult<Schedule> {
    let normalized = if expression.split_whitespace().count() == 5 {
        format!("0 {}", expression)
    } else {
        expression.to_string()
    };
    Schedule::from_str(&normalized).map_err(|e| CoreError::InvalidCron(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_cron_expansion_idempotent() {
        let after = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let first = TaskScheduler::cron_next_occurrence("0 */6 * * *", after).unwrap();
        let second = TaskScheduler::cron_next_occurrence("0 */6 * * *", after).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, Some(Utc.with_ymd_and_hms(2025, 1, 1, 6, 0, 0).unwrap()));
    }

    #[test]
    fn test_invalid_cron_rejected() {
        let result = TaskScheduler::cron_next_occurrence("not a cron", Utc::now());
        assert!(matches!(result, Err(CoreError::InvalidCron(_))));
    }
}
