//! Workflow definition trait and supporting types

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::argument::Argument;
use crate::error::Result;
use crate::instance::WorkflowInstance;
use crate::state::{ActionMap, GlobalState, StateMachine};

/// Types usable as workflow states
///
/// Workflows without a state machine use `()`.
pub trait StateKey:
    Clone + Eq + Hash + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> StateKey for T where
    T: Clone + Eq + Hash + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// How an instance is treated when the engine reloads from its store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBehavior {
    /// Recreate and restart the instance from its persisted events
    #[default]
    Restore,
    /// Skip it; a restored parent recreates it
    Bypass,
}

/// An argument a workflow expects on its instance
#[derive(Debug, Clone)]
pub enum ArgumentSlot {
    /// Bind to the caller's argument of this name, creating an empty one if absent
    Declared(String),
    /// Always use this argument, replacing a caller's argument of the same name
    Preset(Arc<Argument>),
}

impl ArgumentSlot {
    pub fn declared(name: impl Into<String>) -> Self {
        ArgumentSlot::Declared(name.into())
    }

    pub fn preset(argument: Arc<Argument>) -> Self {
        ArgumentSlot::Preset(argument)
    }

    pub fn name(&self) -> &str {
        match self {
            ArgumentSlot::Declared(name) => name,
            ArgumentSlot::Preset(argument) => argument.name(),
        }
    }
}

/// A unit of workflow logic
///
/// A workflow is either unconditioned (only [`execute`](Workflow::execute))
/// or state-driven: [`configure_states`](Workflow::configure_states) sets an
/// initial state and per-state action tables, and `execute` parks on
/// [`WorkflowInstance::await_action`] until an exit state is reached. The
/// default `execute` does exactly that for state-driven workflows and returns
/// immediately otherwise.
///
/// # Example
///
/// ```ignore
/// struct Approval;
///
/// #[async_trait]
/// impl Workflow for Approval {
///     type State = ApprovalState;
///
///     fn configure_states(&self, machine: &mut StateMachine<ApprovalState>) -> Result<()> {
///         machine.set_initial_state(ApprovalState::Pending);
///         machine.state(ApprovalState::Pending).allow("Approve", ApprovalState::Approved)?;
///         machine.state(ApprovalState::Approved).set_exit_state();
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Workflow: Send + Sync + 'static {
    /// State type of the workflow's state machine
    type State: StateKey;

    /// Name used for persistence and the type registry
    fn workflow_type(&self) -> &str {
        short_type_name(std::any::type_name::<Self>())
    }

    /// Parameters the registry needs to recreate this workflow
    fn parameters(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    fn load_behavior(&self) -> LoadBehavior {
        LoadBehavior::Restore
    }

    /// Arguments this workflow binds on its instance at start
    fn arguments(&self) -> Vec<ArgumentSlot> {
        Vec::new()
    }

    /// Declare states and the initial state
    fn configure_states(&self, _machine: &mut StateMachine<Self::State>) -> Result<()> {
        Ok(())
    }

    /// Declare actions legal in every state
    fn configure_global_state(&self, _global: &mut GlobalState<Self::State>) -> Result<()> {
        Ok(())
    }

    /// Declare named handlers consulted after the state tables
    fn configure_actions(&self, _actions: &mut ActionMap<Self::State>) -> Result<()> {
        Ok(())
    }

    /// Body of work, run once per instance start
    async fn execute(&self, instance: &WorkflowInstance<Self::State>) -> Result<()> {
        if instance.is_state_driven() {
            instance.await_action(true).await
        } else {
            Ok(())
        }
    }

    /// Veto hook; return false to refuse cancellation
    fn on_cancel(&self, _instance: &WorkflowInstance<Self::State>) -> bool {
        true
    }

    /// Runs once when cancellation is accepted
    fn on_cancelling(&self, _instance: &WorkflowInstance<Self::State>) {}

    /// Runs after every state transition, before the target state's enter hooks
    fn on_state_change(
        &self,
        _instance: &WorkflowInstance<Self::State>,
        _from: Option<&Self::State>,
        _to: &Self::State,
    ) {
    }
}

/// Last path segment of a type name, without generic arguments
pub(crate) fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
