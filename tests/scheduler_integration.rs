//! Scheduler integration: retry exhaustion, priority ordering, locking,
//! dependencies, cancellation, and cron expansion

use chrono::Utc;
use medshift::config::SchedulerConfig;
use medshift::error::CoreError;
use medshift::scheduler::{
    RetryConfig, RetryStrategy, TaskDefinition, TaskDependency, TaskPriority, TaskRegistry,
    TaskScheduler, TaskStatus,
};
use medshift::store::MemoryKvStore;
use proptest::prelude::*;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn scheduler_with(registry: Arc<TaskRegistry>) -> Arc<TaskScheduler> {
    init_tracing();
    TaskScheduler::new(
        SchedulerConfig {
            lock_retry_delay_ms: 5,
            lock_max_wait_secs: 1,
            ..SchedulerConfig::default()
        },
        registry,
        Arc::new(MemoryKvStore::new()),
    )
}

async fn wait_for<F: Fn() -> bool>(condition: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

/// Exponential backoff with jitter disabled follows 1s, 2s, 4s, 8s exactly,
/// clamped by the max delay; this is the delay schedule a max_attempts=4
/// task observes.
#[test]
fn retry_delay_schedule() {
    use medshift::scheduler::{TaskExecution, TaskRetryManager};

    let manager = TaskRetryManager::new();
    let config = RetryConfig {
        strategy: RetryStrategy::Exponential,
        max_attempts: 4,
        initial_delay_secs: 1,
        max_delay_secs: 60,
        backoff_multiplier: 2.0,
        jitter: false,
    };

    let definition = TaskDefinition::new("flaky", "Flaky", "jobs.flaky");
    let delays: Vec<u64> = (0..4)
        .map(|attempt| {
            let mut execution = TaskExecution::pending(&definition, Utc::now());
            execution.retry_count = attempt;
            manager.calculate_delay(&execution, &config).as_secs()
        })
        .collect();
    assert_eq!(delays, vec![1, 2, 4, 8]);

    let mut exhausted = TaskExecution::pending(&definition, Utc::now());
    exhausted.retry_count = 4;
    assert!(!manager.should_retry(&exhausted, &config));
}

/// A task failing on every attempt retries up to max_attempts and then
/// stays failed with no further retry queued.
#[tokio::test]
async fn retry_until_exhaustion() {
    let registry = Arc::new(TaskRegistry::new());
    let attempts = Arc::new(AtomicU32::new(0));
    let attempts_in_task = attempts.clone();
    registry.register("jobs.always_fails", move |_ctx| {
        let attempts = attempts_in_task.clone();
        async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(CoreError::TaskFailed("induced".to_string()))
        }
    });

    let scheduler = scheduler_with(registry);
    let retry = RetryConfig {
        strategy: RetryStrategy::Exponential,
        max_attempts: 4,
        initial_delay_secs: 0,
        max_delay_secs: 60,
        backoff_multiplier: 2.0,
        jitter: false,
    };
    scheduler
        .register_task(TaskDefinition::new("flaky", "Flaky", "jobs.always_fails").retry(retry))
        .unwrap();

    scheduler.start().await;
    scheduler.schedule_task("flaky", None).unwrap();

    // Initial attempt plus four retries
    assert!(
        wait_for(|| attempts.load(Ordering::SeqCst) == 5, Duration::from_secs(10)).await,
        "expected 5 attempts, saw {}",
        attempts.load(Ordering::SeqCst)
    );
    // Let any stray retry land, then confirm none did
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 5);

    let history = scheduler.history_for("flaky");
    let last = history.last().unwrap();
    assert_eq!(last.status, TaskStatus::Failed);
    assert_eq!(last.retry_count, 4);

    scheduler.stop(true).await;
}

/// A critical task queued behind lower-priority work still runs first.
#[tokio::test]
async fn priority_dequeue_order() {
    let registry = Arc::new(TaskRegistry::new());
    let order: Arc<parking_lot::Mutex<Vec<String>>> = Arc::new(parking_lot::Mutex::new(Vec::new()));
    for name in ["low", "normal", "critical"] {
        let order = order.clone();
        let label = name.to_string();
        registry.register(&format!("jobs.{}", name), move |_ctx| {
            let order = order.clone();
            let label = label.clone();
            async move {
                order.lock().push(label);
                Ok(json!(null))
            }
        });
    }

    // One worker at a time so completion order mirrors dequeue order
    let scheduler = TaskScheduler::new(
        SchedulerConfig {
            max_concurrent_tasks: 1,
            ..SchedulerConfig::default()
        },
        registry,
        Arc::new(MemoryKvStore::new()),
    );
    scheduler
        .register_task(
            TaskDefinition::new("low", "Low", "jobs.low").priority(TaskPriority::Low),
        )
        .unwrap();
    scheduler
        .register_task(
            TaskDefinition::new("normal", "Normal", "jobs.normal").priority(TaskPriority::Normal),
        )
        .unwrap();
    scheduler
        .register_task(
            TaskDefinition::new("critical", "Critical", "jobs.critical")
                .priority(TaskPriority::Critical),
        )
        .unwrap();

    // Queue before starting so the dequeue order is observable
    scheduler.schedule_task("low", None).unwrap();
    scheduler.schedule_task("normal", None).unwrap();
    scheduler.schedule_task("critical", None).unwrap();
    scheduler.start().await;

    assert!(wait_for(|| order.lock().len() == 3, Duration::from_secs(5)).await);
    assert_eq!(*order.lock(), vec!["critical", "normal", "low"]);
    scheduler.stop(true).await;
}

/// Success dependencies gate execution on a completed upstream run.
#[tokio::test]
async fn dependency_gating() {
    let registry = Arc::new(TaskRegistry::new());
    let order: Arc<parking_lot::Mutex<Vec<&'static str>>> =
        Arc::new(parking_lot::Mutex::new(Vec::new()));
    let upstream_order = order.clone();
    registry.register("jobs.upstream", move |_ctx| {
        let order = upstream_order.clone();
        async move {
            order.lock().push("upstream");
            Ok(json!(null))
        }
    });
    let downstream_order = order.clone();
    registry.register("jobs.downstream", move |_ctx| {
        let order = downstream_order.clone();
        async move {
            order.lock().push("downstream");
            Ok(json!(null))
        }
    });

    let scheduler = scheduler_with(registry);
    scheduler
        .register_task(TaskDefinition::new("upstream", "Upstream", "jobs.upstream"))
        .unwrap();
    scheduler
        .register_task(
            TaskDefinition::new("downstream", "Downstream", "jobs.downstream")
                .depends_on(TaskDependency::success("upstream")),
        )
        .unwrap();

    scheduler.start().await;
    // Downstream first: it must wait in the queue until upstream completes
    scheduler.schedule_task("downstream", None).unwrap();
    scheduler.schedule_task("upstream", None).unwrap();

    assert!(wait_for(|| order.lock().len() == 2, Duration::from_secs(10)).await);
    assert_eq!(*order.lock(), vec!["upstream", "downstream"]);
    scheduler.stop(true).await;
}

/// Cycle registration fails and leaves the earlier registration usable.
#[test]
fn cycle_rejected_at_registration() {
    let registry = Arc::new(TaskRegistry::new());
    let scheduler = scheduler_with(registry);

    scheduler
        .register_task(
            TaskDefinition::new("a", "A", "jobs.a").depends_on(TaskDependency::completion("b")),
        )
        .unwrap();
    let result = scheduler.register_task(
        TaskDefinition::new("b", "B", "jobs.b").depends_on(TaskDependency::completion("a")),
    );
    assert!(matches!(result, Err(CoreError::CircularDependency(_))));
    assert!(scheduler.unregister_task("a"));
}

/// Queued executions cancel immediately; the execution never runs.
#[tokio::test]
async fn cancel_queued_execution() {
    let registry = Arc::new(TaskRegistry::new());
    let runs = Arc::new(AtomicU32::new(0));
    let runs_in_task = runs.clone();
    registry.register("jobs.countme", move |_ctx| {
        let runs = runs_in_task.clone();
        async move {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(json!(null))
        }
    });

    let scheduler = scheduler_with(registry);
    scheduler
        .register_task(TaskDefinition::new("countme", "Count", "jobs.countme"))
        .unwrap();

    // Far-future schedule keeps it in the queue
    let execution_id = scheduler
        .schedule_task("countme", Some(Utc::now() + chrono::Duration::hours(1)))
        .unwrap();
    assert!(scheduler.cancel_task(execution_id));
    assert!(!scheduler.cancel_task(execution_id));

    scheduler.start().await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    scheduler.stop(true).await;
}

/// With require_lock, two executions of the same task id never overlap.
#[tokio::test]
async fn lock_serializes_executions() {
    let registry = Arc::new(TaskRegistry::new());
    let concurrent = Arc::new(AtomicU32::new(0));
    let peak = Arc::new(AtomicU32::new(0));
    let (concurrent_in_task, peak_in_task) = (concurrent.clone(), peak.clone());
    registry.register("jobs.exclusive", move |_ctx| {
        let concurrent = concurrent_in_task.clone();
        let peak = peak_in_task.clone();
        async move {
            let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            concurrent.fetch_sub(1, Ordering::SeqCst);
            Ok(json!(null))
        }
    });

    let scheduler = scheduler_with(registry);
    scheduler
        .register_task(TaskDefinition::new("exclusive", "Exclusive", "jobs.exclusive").with_lock())
        .unwrap();

    scheduler.start().await;
    scheduler.schedule_task("exclusive", None).unwrap();
    // Second execution of the same task id while the first may still hold
    // the lock
    tokio::time::sleep(Duration::from_millis(5)).await;
    scheduler.schedule_task("exclusive", None).unwrap();

    assert!(
        wait_for(
            || scheduler.history_for("exclusive").len() == 2,
            Duration::from_secs(10)
        )
        .await
    );
    assert_eq!(peak.load(Ordering::SeqCst), 1);
    scheduler.stop(true).await;
}

/// Unknown function paths fail the execution with a dedicated error kind.
#[tokio::test]
async fn unknown_function_path_fails() {
    let registry = Arc::new(TaskRegistry::new());
    let scheduler = scheduler_with(registry);
    scheduler
        .register_task(TaskDefinition::new("ghost", "Ghost", "jobs.not_registered"))
        .unwrap();

    scheduler.start().await;
    scheduler.schedule_task("ghost", None).unwrap();
    assert!(
        wait_for(
            || scheduler.history_for("ghost").len() == 1,
            Duration::from_secs(5)
        )
        .await
    );
    let history = scheduler.history_for("ghost");
    assert_eq!(history[0].status, TaskStatus::Failed);
    assert!(history[0].error.as_deref().unwrap().contains("not registered"));
    scheduler.stop(true).await;
}

/// Cron expansion is lazy and idempotent: the same expression after the
/// same instant always produces the same next occurrence.
#[test]
fn cron_next_occurrence_idempotent() {
    let after = Utc::now();
    let first = TaskScheduler::cron_next_occurrence("*/15 * * * *", after).unwrap();
    let second = TaskScheduler::cron_next_occurrence("*/15 * * * *", after).unwrap();
    assert_eq!(first, second);
    assert!(first.unwrap() > after);
}

proptest! {
    /// Dequeue always yields a task whose priority is at least as high as
    /// everything left in the queue.
    #[test]
    fn dequeue_priority_invariant(priorities in proptest::collection::vec(0u8..5, 1..40)) {
        use medshift::scheduler::{PriorityTaskQueue, TaskExecution};

        let bands = [
            TaskPriority::Critical,
            TaskPriority::High,
            TaskPriority::Normal,
            TaskPriority::Low,
            TaskPriority::Background,
        ];
        let mut queue = PriorityTaskQueue::new();
        for (index, band) in priorities.iter().enumerate() {
            let definition = TaskDefinition::new(
                format!("t{}", index),
                format!("t{}", index),
                "noop",
            )
            .priority(bands[*band as usize]);
            queue.enqueue(TaskExecution::pending(&definition, Utc::now()));
        }

        let mut previous = TaskPriority::Critical;
        while let Some(execution) = queue.dequeue() {
            prop_assert!(previous <= execution.priority);
            previous = execution.priority;
        }
    }
}
