//! Runtime configuration for the scheduling core
//!
//! Layered via the `config` crate: built-in defaults, then `MEDSHIFT_*`
//! environment overrides (e.g. `MEDSHIFT_SCHEDULER__MAX_CONCURRENT_TASKS=4`).

use crate::constants::{
    LOCK_TTL_SECS, MAX_WEBHOOK_PAYLOAD_BYTES, WEBHOOK_TIMESTAMP_TOLERANCE_SECS,
};
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

/// Scheduler tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum task executions running at once
    pub max_concurrent_tasks: usize,
    /// Default lock TTL in seconds
    pub lock_ttl_secs: u64,
    /// Delay between lock acquisition attempts, in milliseconds
    pub lock_retry_delay_ms: u64,
    /// Maximum time to wait for a lock, in seconds
    pub lock_max_wait_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 10,
            lock_ttl_secs: LOCK_TTL_SECS,
            lock_retry_delay_ms: 500,
            lock_max_wait_secs: 30,
        }
    }
}

/// Webhook verification tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Maximum age for webhook requests, in seconds
    pub timestamp_tolerance_secs: i64,
    /// Enable IP whitelist validation
    pub enable_ip_whitelist: bool,
    /// Enable duplicate delivery detection
    pub enable_retry_detection: bool,
    /// Maximum allowed payload size in bytes
    pub max_payload_bytes: usize,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timestamp_tolerance_secs: WEBHOOK_TIMESTAMP_TOLERANCE_SECS,
            enable_ip_whitelist: true,
            enable_retry_detection: true,
            max_payload_bytes: MAX_WEBHOOK_PAYLOAD_BYTES,
        }
    }
}

/// Import staging tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Create a block on demand when an applied row has no block on its date.
    /// When false, apply refuses such rows instead.
    pub create_missing_blocks: bool,
    /// Transaction timeout for apply/rollback scopes, in seconds
    pub transaction_timeout_secs: u64,
    /// Retries for transient transaction conflicts
    pub transaction_max_retries: u32,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            create_missing_blocks: true,
            transaction_timeout_secs: 60,
            transaction_max_retries: 3,
        }
    }
}

/// Faceted search tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Facet cache capacity (entries)
    pub cache_capacity: usize,
    /// Facet cache TTL in seconds
    pub cache_ttl_secs: u64,
    /// Per-entity-type result limit
    pub per_type_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 256,
            cache_ttl_secs: 300,
            per_type_limit: 100,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

impl CoreConfig {
    /// Load configuration from defaults plus `MEDSHIFT_*` environment overrides
    pub fn load() -> CoreResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::Environment::with_prefix("MEDSHIFT").separator("__"))
            .build()
            .map_err(|e| CoreError::Internal(format!("config build error: {}", e)))?;

        // Missing keys fall back to serde defaults.
        let mut cfg: CoreConfig = settings
            .try_deserialize()
            .unwrap_or_default();
        if cfg.scheduler.max_concurrent_tasks == 0 {
            cfg.scheduler.max_concurrent_tasks = SchedulerConfig::default().max_concurrent_tasks;
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = CoreConfig::default();
        assert_eq!(cfg.scheduler.max_concurrent_tasks, 10);
        assert_eq!(cfg.webhook.timestamp_tolerance_secs, 300);
        assert_eq!(cfg.import.transaction_max_retries, 3);
        assert!(cfg.import.create_missing_blocks);
    }

    #[test]
    fn test_load_without_env() {
        let cfg = CoreConfig::load().unwrap();
        assert_eq!(cfg.search.per_type_limit, 100);
    }
}
