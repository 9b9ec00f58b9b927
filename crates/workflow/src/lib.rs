//! # Workflow Orchestration Runtime
//!
//! A hierarchical workflow and state-machine runtime for long-running,
//! human-in-the-loop processes.
//!
//! ## Features
//!
//! - **Shared arguments**: typed, lock-protected cells flowing from parent to child workflows
//! - **Declarative state tables**: per-state actions with guards, tags and handlers
//! - **Action rendezvous**: bodies park until an external action arrives; one action at a time
//! - **Composite control flow**: sequential, parallel, if/else, while and delay workflows
//! - **Cooperative cancellation**: veto hooks and tokens shared with every descendant
//! - **Optional persistence**: lifecycle events and checkpoints in memory or PostgreSQL
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      WorkflowEngine                          │
//! │  (instance registry, type registry, lifecycle broadcast)    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ creates
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    WorkflowInstance<S>                       │
//! │  (arguments, state machine, action gate, cancellation)      │
//! └─────────────────────────────────────────────────────────────┘
//!            │ runs                                │ records
//!            ▼                                     ▼
//! ┌──────────────────────────┐   ┌──────────────────────────────┐
//! │      Workflow (trait)     │   │     WorkflowStore (trait)     │
//! │  (states, handlers, body) │   │  (events, sync checkpoints)   │
//! └──────────────────────────┘   └──────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use everruns_workflow::prelude::*;
//!
//! let engine = WorkflowEngine::new();
//! let instance = engine.create_workflow(ApprovalWorkflow);
//! instance.start(Vec::new()).await?;
//!
//! instance
//!     .action(ActionRequest::new("Assign").argument(Argument::new("AssignTo", "dana")))
//!     .await?;
//! instance.action("Approve").await?;
//! instance.action("Accept").await?;
//!
//! instance.wait().await?;
//! assert_eq!(instance.current_state(), Some(ApprovalState::Accepted));
//! ```

pub mod approval;
pub mod argument;
pub mod composite;
pub mod config;
pub mod engine;
pub mod error;
pub mod instance;
pub mod persistence;
pub mod state;
pub mod telemetry;
pub mod workflow;

/// Prelude for common imports
pub mod prelude {
    pub use crate::approval::{ApprovalState, ApprovalWorkflow};
    pub use crate::argument::{Argument, ArgumentEnum, Arguments, FromValue, Value};
    pub use crate::composite::{
        Delay, DelayUntil, DelayUntilCondition, Empty, IfElse, Parallel, Sequential, While,
    };
    pub use crate::config::EngineConfig;
    pub use crate::engine::{LifecycleEvent, WorkflowDescriptor, WorkflowEngine};
    pub use crate::error::{Result, WorkflowError};
    pub use crate::instance::{ActionRequest, AnyInstance, StartOptions, WorkflowInstance};
    pub use crate::persistence::{
        InMemoryWorkflowStore, PostgresWorkflowStore, StoreEvent, StoreState, StoreSync,
        StoredEvent, WorkflowStore,
    };
    pub use crate::state::{
        ActionContext, ActionMap, ActionRule, GlobalState, StateBehavior, StateMachine,
        WorkflowState,
    };
    pub use crate::workflow::{ArgumentSlot, DynWorkflow, LoadBehavior, Workflow};
    pub use async_trait::async_trait;
}

// Re-export key types at crate root
pub use approval::{ApprovalState, ApprovalWorkflow};
pub use argument::{Argument, ArgumentEnum, Arguments, FromValue, Value};
pub use config::EngineConfig;
pub use engine::{
    ArgumentDescriptor, LifecycleEvent, RegistryError, WorkflowDescriptor, WorkflowEngine,
    WorkflowRegistry,
};
pub use error::{Result, WorkflowError};
pub use instance::{ActionRequest, AnyInstance, StartOptions, WorkflowInstance};
pub use persistence::{
    InMemoryWorkflowStore, PostgresWorkflowStore, StoreError, StoreEvent, StoreState, StoreSync,
    StoredEvent, WorkflowStore,
};
pub use state::{ActionContext, ActionMap, ActionRule, GlobalState, StateMachine, WorkflowState};
pub use telemetry::{init_telemetry, TelemetryConfig};
pub use workflow::{ArgumentSlot, DynWorkflow, LoadBehavior, StateKey, Workflow};
