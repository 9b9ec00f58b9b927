//! Workflow engine
//!
//! The engine module provides the `WorkflowEngine`, which creates instances,
//! keeps them addressable by id, builds workflows from registered type names
//! and fans lifecycle events out to subscribers and the optional store.

mod descriptor;
mod registry;
mod workflow_engine;

pub use descriptor::{ArgumentDescriptor, LifecycleEvent, WorkflowDescriptor};
pub use registry::{RegistryError, WorkflowFactory, WorkflowRegistry};
pub(crate) use workflow_engine::EngineShared;
pub use workflow_engine::WorkflowEngine;
