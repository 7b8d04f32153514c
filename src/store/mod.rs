//! Persistence and key-value ports
//!
//! The core consumes two interfaces: a `Datastore` for entity CRUD with
//! transactional scopes, and a `KeyValueStore` for cross-process coordination
//! (distributed locks). In-memory implementations back tests and single-node
//! deployments.

pub mod datastore;
pub mod kv;
pub mod memory;

pub use datastore::Datastore;
pub use kv::{KeyValueStore, MemoryKvStore};
pub use memory::MemoryStore;
