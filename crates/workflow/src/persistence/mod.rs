//! Persistence layer for workflow lifecycle events and checkpoints
//!
//! This module provides:
//! - `WorkflowStore` trait for pluggable storage backends
//! - `InMemoryWorkflowStore` for testing
//! - `PostgresWorkflowStore` for production use
//! - `StoreSync` for idempotent checkpoints inside workflow bodies

mod memory;
mod postgres;
mod store;
mod sync;

pub use memory::InMemoryWorkflowStore;
pub use postgres::PostgresWorkflowStore;
pub use store::{StoreError, StoreEvent, StoreState, StoredEvent, WorkflowStore};
pub use sync::StoreSync;
