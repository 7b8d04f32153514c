//! Task function registry
//!
//! Task definitions carry a function path string; the registry maps those
//! paths to handlers at process start, and resolution happens at execution
//! time. Unknown paths fail with a dedicated error kind.

use crate::error::{CoreError, CoreResult};
use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Runtime context handed to a task function
#[derive(Clone)]
pub struct TaskContext {
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
    cancelled: Arc<AtomicBool>,
}

impl TaskContext {
    pub fn new(args: Vec<Value>, kwargs: Map<String, Value>, cancelled: Arc<AtomicBool>) -> Self {
        Self {
            args,
            kwargs,
            cancelled,
        }
    }

    /// Cooperative cancellation: long-running functions should poll this at
    /// convenient suspension points and wind down when set
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// A registered task function
pub type TaskHandler =
    Arc<dyn Fn(TaskContext) -> BoxFuture<'static, CoreResult<Value>> + Send + Sync>;

/// Name-to-handler registry
#[derive(Default)]
pub struct TaskRegistry {
    handlers: DashMap<String, TaskHandler>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under a function path
    pub fn register<F, Fut>(&self, function_path: &str, handler: F)
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = CoreResult<Value>> + Send + 'static,
    {
        let handler: TaskHandler = Arc::new(move |ctx| Box::pin(handler(ctx)));
        self.handlers.insert(function_path.to_string(), handler);
        info!(function_path, "registered task function");
    }

    /// Resolve a function path; unknown names are an error, not a lookup miss
    pub fn resolve(&self, function_path: &str) -> CoreResult<TaskHandler> {
        self.handlers
            .get(function_path)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| CoreError::UnknownTask(function_path.to_string()))
    }

    pub fn contains(&self, function_path: &str) -> bool {
        self.handlers.contains_key(function_path)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_register_and_resolve() {
        let registry = TaskRegistry::new();
        registry.register("jobs.echo", |ctx: TaskContext| async move {
            Ok(json!({ "args": ctx.args }))
        });

        let handler = registry.resolve("jobs.echo").unwrap();
        let ctx = TaskContext::new(
            vec![json!(1)],
            Map::new(),
            Arc::new(AtomicBool::new(false)),
        );
        let result = handler(ctx).await.unwrap();
        assert_eq!(result["args"][0], 1);
    }

    #[test]
    fn test_unknown_path_is_error() {
        let registry = TaskRegistry::new();
        let result = registry.resolve("jobs.missing");
        assert!(matches!(result, Err(CoreError::UnknownTask(_))));
    }
}
