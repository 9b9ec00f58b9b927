//! Workflow definitions
//!
//! - [`Workflow`]: the trait user code implements
//! - [`StateKey`]: bound for state types
//! - [`ArgumentSlot`]: arguments a workflow binds on start
//! - [`DynWorkflow`]: type-erased definitions for composites and the registry

mod definition;
mod erased;

pub use definition::{ArgumentSlot, LoadBehavior, StateKey, Workflow};
pub use erased::DynWorkflow;
