//! Object-safe view of an instance, whatever its state type

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{ActionRequest, WorkflowInstance};
use crate::argument::{Argument, Arguments, Value};
use crate::engine::WorkflowDescriptor;
use crate::error::Result;
use crate::persistence::StoreState;
use crate::workflow::{LoadBehavior, StateKey};

/// What the engine, composites and stores need from any instance
///
/// States cross this boundary as JSON.
#[async_trait]
pub trait AnyInstance: Send + Sync + 'static {
    fn id(&self) -> Uuid;

    fn parent_id(&self) -> Option<Uuid>;

    fn workflow_type(&self) -> String;

    /// Parameters the workflow was constructed from
    fn parameters(&self) -> serde_json::Value;

    fn load_behavior(&self) -> LoadBehavior;

    fn is_started(&self) -> bool;

    fn is_running(&self) -> bool;

    fn is_complete(&self) -> bool;

    fn is_in_error(&self) -> bool;

    fn is_cancelled(&self) -> bool;

    fn is_in_action(&self) -> bool;

    fn is_exit_state(&self) -> bool;

    fn error(&self) -> Option<String>;

    fn arguments(&self) -> Arguments;

    fn argument(&self, name: &str) -> Option<Arc<Argument>>;

    /// Current state as JSON, `null` without one
    fn state_json(&self) -> serde_json::Value;

    /// Snapshot for persistence
    fn store_state(&self) -> StoreState {
        StoreState {
            state: self.state_json(),
            arguments: self.arguments().to_map(),
            parameters: self.parameters(),
        }
    }

    /// Overwrite arguments and state from a stored snapshot
    fn apply_store_state(&self, stored: &StoreState) -> Result<()>;

    /// Start without waiting, optionally in a state given as JSON
    fn launch(
        &self,
        arguments: Arguments,
        state: Option<serde_json::Value>,
        cancellation: Option<CancellationToken>,
    ) -> Result<()>;

    fn trigger_exit_state(&self);

    fn descriptor(&self) -> WorkflowDescriptor {
        WorkflowDescriptor::of(self)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    async fn start(&self, arguments: Arguments, synchronous: bool) -> Result<()>;

    async fn action(&self, request: ActionRequest) -> Result<Value>;

    fn action_detached(&self, request: ActionRequest) -> Result<JoinHandle<Result<Value>>>;

    async fn wait(&self) -> Result<()>;

    async fn wait_action(&self);

    async fn cancel(&self) -> Result<bool>;

    async fn allowed_actions(&self, tag: Option<&str>) -> Result<Vec<String>>;

    /// Cancel without the veto hook and refuse further actions
    fn dispose(&self);
}

impl std::fmt::Debug for dyn AnyInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnyInstance")
            .field("id", &self.id())
            .field("parent_id", &self.parent_id())
            .field("workflow_type", &self.workflow_type())
            .field("current_state", &self.state_json())
            .field("is_complete", &self.is_complete())
            .finish()
    }
}

#[async_trait]
impl<S: StateKey> AnyInstance for WorkflowInstance<S> {
    fn id(&self) -> Uuid {
        self.id
    }

    fn parent_id(&self) -> Option<Uuid> {
        self.parent_id
    }

    fn workflow_type(&self) -> String {
        self.workflow.workflow_type().to_string()
    }

    fn parameters(&self) -> serde_json::Value {
        self.workflow.parameters()
    }

    fn load_behavior(&self) -> LoadBehavior {
        self.workflow.load_behavior()
    }

    fn is_started(&self) -> bool {
        WorkflowInstance::is_started(self)
    }

    fn is_running(&self) -> bool {
        WorkflowInstance::is_running(self)
    }

    fn is_complete(&self) -> bool {
        WorkflowInstance::is_complete(self)
    }

    fn is_in_error(&self) -> bool {
        WorkflowInstance::is_in_error(self)
    }

    fn is_cancelled(&self) -> bool {
        WorkflowInstance::is_cancelled(self)
    }

    fn is_in_action(&self) -> bool {
        WorkflowInstance::is_in_action(self)
    }

    fn is_exit_state(&self) -> bool {
        WorkflowInstance::is_exit_state(self)
    }

    fn error(&self) -> Option<String> {
        WorkflowInstance::error(self)
    }

    fn arguments(&self) -> Arguments {
        WorkflowInstance::arguments(self)
    }

    fn argument(&self, name: &str) -> Option<Arc<Argument>> {
        WorkflowInstance::argument(self, name)
    }

    fn state_json(&self) -> serde_json::Value {
        // Before setup the requested start state stands in for the current one
        self.current_state()
            .or_else(|| self.start_state.lock().clone())
            .and_then(|state| serde_json::to_value(state).ok())
            .unwrap_or(serde_json::Value::Null)
    }

    fn apply_store_state(&self, stored: &StoreState) -> Result<()> {
        for (name, value) in &stored.arguments {
            self.set_argument(name, value.clone());
        }
        if stored.state.is_null() {
            return Ok(());
        }

        let state: S = serde_json::from_value(stored.state.clone())?;
        if self.signals.is_ready() {
            self.set_state(state)
        } else {
            *self.start_state.lock() = Some(state);
            Ok(())
        }
    }

    fn launch(
        &self,
        arguments: Arguments,
        state: Option<serde_json::Value>,
        cancellation: Option<CancellationToken>,
    ) -> Result<()> {
        let initial_state = match state {
            Some(json) if !json.is_null() => Some(serde_json::from_value::<S>(json)?),
            _ => None,
        };
        WorkflowInstance::launch(self, arguments, initial_state, cancellation)
    }

    fn trigger_exit_state(&self) {
        WorkflowInstance::trigger_exit_state(self)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    async fn start(&self, arguments: Arguments, synchronous: bool) -> Result<()> {
        let options = super::StartOptions::new()
            .arguments(arguments)
            .synchronous(synchronous);
        self.start_with(options).await
    }

    async fn action(&self, request: ActionRequest) -> Result<Value> {
        WorkflowInstance::action(self, request).await
    }

    fn action_detached(&self, request: ActionRequest) -> Result<JoinHandle<Result<Value>>> {
        WorkflowInstance::action_detached(self, request)
    }

    async fn wait(&self) -> Result<()> {
        WorkflowInstance::wait(self).await
    }

    async fn wait_action(&self) {
        WorkflowInstance::wait_action(self).await
    }

    async fn cancel(&self) -> Result<bool> {
        WorkflowInstance::cancel(self).await
    }

    async fn allowed_actions(&self, tag: Option<&str>) -> Result<Vec<String>> {
        WorkflowInstance::allowed_actions(self, tag).await
    }

    fn dispose(&self) {
        WorkflowInstance::dispose(self)
    }
}
