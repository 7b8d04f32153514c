//! Scheduling and resilience core for medical residency workforce management
//!
//! This crate provides the computation and background-execution core of a
//! residency scheduling system:
//! - ACGME compliance validation (80-hour, 1-in-7, supervision ratios)
//! - N-1/N-2 contingency simulation and Le Chatelier equilibrium analysis
//! - An advanced task scheduler (priority queue, DAG dependencies,
//!   distributed locking, retry with backoff, health monitoring)
//! - The import staging pipeline (parse, fuzzy match, stage, apply, rollback)
//! - Webhook verification with HMAC signatures and replay protection
//! - Cache-backed faceted search and RFC 5545 calendar export
//!
//! The HTTP layer, database migrations, and rendering live outside the core;
//! it consumes a persistence port (`store::Datastore`) and a key-value port
//! (`store::KeyValueStore`) and exposes pure computation plus managed
//! background execution.

pub mod calendar;
pub mod compliance;
pub mod config;
pub mod constants;
pub mod domain;
pub mod error;
pub mod import;
pub mod resilience;
pub mod scheduler;
pub mod search;
pub mod store;
pub mod swaps;
pub mod validation;
pub mod webhook;

pub use calendar::CalendarService;
pub use compliance::{ComplianceOptions, ComplianceReport, ComplianceValidator};
pub use config::CoreConfig;
pub use error::{CoreError, CoreResult};
pub use import::ImportStagingService;
pub use resilience::{ContingencyAnalyzer, ContingencyOptions, LeChatelierAnalyzer};
pub use scheduler::{TaskRegistry, TaskScheduler};
pub use search::FacetedSearchService;
pub use store::{Datastore, KeyValueStore, MemoryKvStore, MemoryStore};
pub use swaps::SwapService;
pub use webhook::WebhookVerifier;
