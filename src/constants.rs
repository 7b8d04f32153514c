//! Shared constants for the scheduling core

/// Work hours contributed by a single half-day block
pub const HOURS_PER_BLOCK: f64 = 6.0;

/// ACGME weekly work-hour ceiling (averaged over rolling 4-week windows)
pub const MAX_WEEKLY_HOURS: f64 = 80.0;

/// Warning threshold as a fraction of the weekly ceiling
pub const WEEKLY_HOURS_WARNING_RATIO: f64 = 0.95;

/// Maximum consecutive duty days before a 1-in-7 violation
pub const MAX_CONSECUTIVE_DUTY_DAYS: u32 = 6;

/// Rolling work-hour window length, in calendar days inclusive
pub const ROLLING_WINDOW_DAYS: i64 = 28;

/// Similarity score (0-100) above which an import name is considered matched
pub const FUZZY_MATCH_THRESHOLD: u8 = 70;

/// Hours after apply during which a batch may be rolled back
pub const ROLLBACK_WINDOW_HOURS: i64 = 24;

/// Bounded task-history ring used for dependency resolution
pub const TASK_HISTORY_LIMIT: usize = 1000;

/// Errors retained by the scheduler health monitor
pub const ERROR_LOG_LIMIT: usize = 100;

/// Default maximum webhook payload size (1 MiB)
pub const MAX_WEBHOOK_PAYLOAD_BYTES: usize = 1_048_576;

/// Default webhook timestamp tolerance in seconds
pub const WEBHOOK_TIMESTAMP_TOLERANCE_SECS: i64 = 300;

/// Default distributed lock TTL in seconds
pub const LOCK_TTL_SECS: u64 = 300;

/// Activity types treated as critical services
pub const CRITICAL_SERVICES: &[&str] =
    &["inpatient", "call", "emergency", "procedure", "trauma", "icu"];
