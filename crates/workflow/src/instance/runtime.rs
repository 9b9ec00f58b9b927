//! Instance lifecycle: start, execution, completion, cancellation and children

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::signals::Signals;
use super::{AnyInstance, StartOptions};
use crate::argument::{Argument, Arguments, FromValue, Value};
use crate::engine::{EngineShared, WorkflowEngine};
use crate::error::{Result, WorkflowError};
use crate::persistence::{StoreEvent, StoreSync};
use crate::state::StateMachine;
use crate::workflow::{ArgumentSlot, DynWorkflow, StateKey, Workflow};

#[derive(Default)]
pub(super) struct Flags {
    pub started: AtomicBool,
    pub running: AtomicBool,
    pub complete: AtomicBool,
    pub in_error: AtomicBool,
    pub cancelled: AtomicBool,
    pub in_action: AtomicBool,
    pub exit_state: AtomicBool,
}

pub(super) struct StateTrack<S> {
    pub current: Option<S>,
    pub last: Option<S>,
}

/// The runtime driver of one workflow
///
/// Created by [`WorkflowEngine`]; always handled through an `Arc`.
pub struct WorkflowInstance<S: StateKey> {
    pub(super) id: Uuid,
    pub(super) parent_id: Option<Uuid>,
    pub(super) workflow: Arc<dyn Workflow<State = S>>,
    pub(super) engine: Weak<EngineShared>,
    pub(super) this: Weak<WorkflowInstance<S>>,
    pub(super) created_at: DateTime<Utc>,

    pub(super) arguments: RwLock<Arguments>,
    pub(super) action_arguments: RwLock<Arguments>,
    pub(super) machine: Mutex<StateMachine<S>>,
    pub(super) states: RwLock<StateTrack<S>>,
    pub(super) start_state: Mutex<Option<S>>,
    pub(super) flags: Flags,
    pub(super) failure: Mutex<Option<String>>,

    pub(super) cancellation: OnceLock<CancellationToken>,
    pub(super) cancel_lock: Mutex<()>,
    /// Tripped when an action handler fails, ending the body
    pub(super) abort: CancellationToken,

    pub(super) signals: Signals,
    /// One action in flight at a time
    pub(super) gate: tokio::sync::Mutex<()>,
    /// One permit per `await_action` park; closed on completion
    pub(super) parked: Semaphore,
}

impl<S: StateKey> WorkflowInstance<S> {
    pub(crate) fn new(
        engine: Weak<EngineShared>,
        workflow: Arc<dyn Workflow<State = S>>,
        id: Uuid,
        parent_id: Option<Uuid>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            id,
            parent_id,
            workflow,
            engine,
            this: this.clone(),
            created_at: Utc::now(),
            arguments: RwLock::new(Arguments::new()),
            action_arguments: RwLock::new(Arguments::new()),
            machine: Mutex::new(StateMachine::new()),
            states: RwLock::new(StateTrack {
                current: None,
                last: None,
            }),
            start_state: Mutex::new(None),
            flags: Flags::default(),
            failure: Mutex::new(None),
            cancellation: OnceLock::new(),
            cancel_lock: Mutex::new(()),
            abort: CancellationToken::new(),
            signals: Signals::new(),
            gate: tokio::sync::Mutex::new(()),
            parked: Semaphore::new(0),
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn parent_id(&self) -> Option<Uuid> {
        self.parent_id
    }

    pub fn workflow_type(&self) -> &str {
        self.workflow.workflow_type()
    }

    pub fn workflow(&self) -> &Arc<dyn Workflow<State = S>> {
        &self.workflow
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Owning engine, if it is still alive
    pub fn engine(&self) -> Option<WorkflowEngine> {
        self.engine.upgrade().map(WorkflowEngine::from_shared)
    }

    /// Strong handle to this instance
    pub fn handle(&self) -> Result<Arc<Self>> {
        self.this
            .upgrade()
            .ok_or(WorkflowError::NotAvailable(self.id))
    }

    pub fn is_started(&self) -> bool {
        self.flags.started.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.flags.running.load(Ordering::SeqCst)
    }

    pub fn is_complete(&self) -> bool {
        self.flags.complete.load(Ordering::SeqCst)
    }

    pub fn is_in_error(&self) -> bool {
        self.flags.in_error.load(Ordering::SeqCst)
    }

    /// True once cancellation was accepted here or signalled by an ancestor
    pub fn is_cancelled(&self) -> bool {
        self.flags.cancelled.load(Ordering::SeqCst)
            || self
                .cancellation
                .get()
                .is_some_and(CancellationToken::is_cancelled)
    }

    pub fn is_in_action(&self) -> bool {
        self.flags.in_action.load(Ordering::SeqCst)
    }

    pub fn is_exit_state(&self) -> bool {
        self.flags.exit_state.load(Ordering::SeqCst)
    }

    /// Whether the workflow declared an initial state
    pub fn is_state_driven(&self) -> bool {
        self.machine.lock().is_state_driven()
    }

    pub fn current_state(&self) -> Option<S> {
        self.states.read().current.clone()
    }

    pub fn last_state(&self) -> Option<S> {
        self.states.read().last.clone()
    }

    /// Failure message once the instance is in error
    pub fn error(&self) -> Option<String> {
        self.failure.lock().clone()
    }

    /// Token shared with every descendant; a fresh token before start
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.get().cloned().unwrap_or_default()
    }

    /// Actions accepted but not yet finished
    pub fn pending_actions(&self) -> usize {
        self.signals.pending()
    }

    // ========================================================================
    // Arguments
    // ========================================================================

    /// Snapshot of the instance's argument set (cells are shared)
    pub fn arguments(&self) -> Arguments {
        self.arguments.read().clone()
    }

    pub fn argument(&self, name: &str) -> Option<Arc<Argument>> {
        self.arguments.read().get(name).cloned()
    }

    /// Argument by name or `ArgumentNotFound`
    pub fn require_argument(&self, name: &str) -> Result<Arc<Argument>> {
        self.argument(name)
            .ok_or_else(|| WorkflowError::ArgumentNotFound(name.to_string()))
    }

    /// Read an argument; a missing argument reads like `Null`
    pub fn argument_value<T: FromValue>(&self, name: &str) -> Result<T> {
        self.arguments.read().value(name)
    }

    /// Set an existing argument, or add a new one under that name
    pub fn set_argument(&self, name: &str, value: impl Into<Value>) {
        let existing = self.argument(name);
        match existing {
            Some(argument) => argument.set(value),
            None => {
                self.arguments.write().insert(Argument::new(name, value));
            }
        }
    }

    /// Add or replace an argument by name
    pub fn add_argument(&self, argument: Arc<Argument>) {
        self.arguments.write().insert(argument);
    }

    /// Arguments of the action currently being processed
    pub fn action_arguments(&self) -> Arguments {
        self.action_arguments.read().clone()
    }

    pub fn action_argument_value<T: FromValue>(&self, name: &str) -> Result<T> {
        self.action_arguments.read().value(name)
    }

    /// Supplied arguments first, then the workflow's own slots
    fn merge_arguments(&self, supplied: Arguments) {
        let mut arguments = self.arguments.write();
        arguments.extend(supplied);
        for slot in self.workflow.arguments() {
            match slot {
                ArgumentSlot::Preset(argument) => {
                    arguments.insert(argument);
                }
                ArgumentSlot::Declared(name) => {
                    arguments.insert_if_absent(Argument::empty(name));
                }
            }
        }
    }

    // ========================================================================
    // State
    // ========================================================================

    /// Move to `state`, running exit and enter hooks
    ///
    /// A no-op when `state` is already current. Enter hooks may call
    /// `set_state` again to auto-advance; a chain that never settles is a
    /// bug in the workflow.
    pub fn set_state(&self, state: S) -> Result<()> {
        let previous = {
            let mut track = self.states.write();
            if track.current.as_ref() == Some(&state) {
                return Ok(());
            }
            let previous = track.current.replace(state.clone());
            track.last = previous.clone();
            previous
        };

        let transition = self.machine.lock().transition(previous.as_ref(), &state);
        if transition.is_exit_state {
            self.flags.exit_state.store(true, Ordering::SeqCst);
        }
        debug!(workflow_id = %self.id, from = ?previous, to = ?state, "state changed");

        if let Some(hook) = transition.exit_hook {
            hook(self)?;
        }
        self.workflow.on_state_change(self, previous.as_ref(), &state);
        if let Some(hook) = transition.first_time_hook {
            hook(self)?;
        }
        if let Some(hook) = transition.enter_hook {
            hook(self)?;
        }
        Ok(())
    }

    /// Mark the state machine as finished without a transition
    pub fn set_exit_state(&self) {
        self.flags.exit_state.store(true, Ordering::SeqCst);
    }

    /// Mark exit and wake a body parked in `await_action`
    pub fn trigger_exit_state(&self) {
        self.set_exit_state();
        self.signals.finish_action();
    }

    pub(super) fn state_label(&self) -> String {
        match self.current_state() {
            Some(state) => format!("{state:?}"),
            None => "none".to_string(),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start with the given arguments and return once execution is scheduled
    pub async fn start(&self, arguments: impl IntoIterator<Item = Arc<Argument>>) -> Result<()> {
        self.start_with(StartOptions::new().arguments(arguments)).await
    }

    /// Start with full options; waits for completion when `synchronous`
    pub async fn start_with(&self, options: StartOptions<S>) -> Result<()> {
        let synchronous = options.synchronous;
        self.launch(options.arguments, options.initial_state, options.cancellation)?;
        if synchronous {
            self.wait().await?;
        }
        Ok(())
    }

    /// Synchronous part of start: flags, arguments, task spawn
    pub(crate) fn launch(
        &self,
        arguments: Arguments,
        initial_state: Option<S>,
        cancellation: Option<CancellationToken>,
    ) -> Result<()> {
        let this = self.handle()?;
        if self.flags.started.swap(true, Ordering::SeqCst) {
            warn!(workflow_id = %self.id, "start called on a started workflow");
            return Err(WorkflowError::AlreadyStarted(self.id));
        }

        let _ = self.cancellation.set(cancellation.unwrap_or_default());
        // A state applied from a snapshot before start is kept
        if initial_state.is_some() {
            *self.start_state.lock() = initial_state;
        }
        self.merge_arguments(arguments);
        self.flags.running.store(true, Ordering::SeqCst);

        info!(
            workflow_id = %self.id,
            workflow_type = %self.workflow_type(),
            parent_id = ?self.parent_id,
            "starting workflow"
        );
        tokio::spawn(this.run());
        Ok(())
    }

    async fn run(self: Arc<Self>) {
        // Usually already recorded at creation; the store ignores repeats
        self.persist(StoreEvent::Create).await;
        self.persist(StoreEvent::Start).await;
        self.notify(StoreEvent::Start);

        let result = self.execute_body().await;
        self.finish(result).await;
    }

    fn configure(&self) -> Result<()> {
        let mut machine = StateMachine::new();
        self.workflow.configure_states(&mut machine)?;
        self.workflow.configure_global_state(machine.global())?;
        self.workflow.configure_actions(machine.actions())?;

        let initial = self
            .start_state
            .lock()
            .take()
            .or_else(|| machine.initial_state().cloned());
        *self.machine.lock() = machine;

        if let Some(state) = initial {
            self.set_state(state)?;
        }
        Ok(())
    }

    async fn execute_body(&self) -> Result<()> {
        self.configure()?;
        self.signals.open_ready();
        self.signals.open_executing();

        let result = tokio::select! {
            biased;
            _ = self.abort.cancelled() => Ok(()),
            result = self.workflow.execute(self) => result,
        };
        if self.abort.is_cancelled() {
            return Err(WorkflowError::execution(
                self.error()
                    .unwrap_or_else(|| "action handler failed".to_string()),
            ));
        }
        result
    }

    async fn finish(&self, result: Result<()>) {
        if self.cancellation_token().is_cancelled() {
            self.mark_cancelled();
        }

        let event = match result {
            Ok(()) => {
                info!(workflow_id = %self.id, "workflow completed");
                StoreEvent::Complete
            }
            Err(e) if e.is_cancelled() => {
                info!(workflow_id = %self.id, "workflow completed after cancellation");
                StoreEvent::Complete
            }
            Err(e) => {
                error!(workflow_id = %self.id, error = %e, "workflow failed");
                self.failure.lock().get_or_insert_with(|| e.to_string());
                self.flags.in_error.store(true, Ordering::SeqCst);
                StoreEvent::Error
            }
        };

        self.flags.complete.store(true, Ordering::SeqCst);
        self.flags.running.store(false, Ordering::SeqCst);
        self.parked.close();
        self.signals.open_ready();
        self.signals.open_executing();

        self.persist(event).await;
        self.notify(event);

        self.signals.complete();
        self.signals.finish_action();
    }

    /// Record an action handler failure and end the body
    pub(super) fn fail(&self, error: &WorkflowError) {
        error!(workflow_id = %self.id, error = %error, "action handler failed");
        self.failure
            .lock()
            .get_or_insert_with(|| error.to_string());
        self.abort.cancel();
    }

    async fn persist(&self, event: StoreEvent) {
        let (Some(engine), Some(this)) = (self.engine.upgrade(), self.this.upgrade()) else {
            return;
        };
        let instance: Arc<dyn AnyInstance> = this;
        engine.persist(event, instance.as_ref()).await;
    }

    fn notify(&self, event: StoreEvent) {
        if let Some(engine) = self.engine.upgrade() {
            engine.notify(event, self.id, self.parent_id, self.workflow_type(), self.error());
        }
    }

    /// Wait until the instance completes, successfully or in error
    pub async fn wait(&self) -> Result<()> {
        if !self.is_started() {
            return Err(WorkflowError::NotStarted(self.id));
        }
        if !self.signals.is_completed() {
            self.signals.wait_completed().await;
        }
        Ok(())
    }

    /// Sleep for `duration`, unwinding with `Cancelled` on cancellation
    pub async fn delay(&self, duration: Duration) -> Result<()> {
        let token = self.cancellation_token();
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = token.cancelled() => Err(WorkflowError::Cancelled),
        }
    }

    // ========================================================================
    // Cancellation
    // ========================================================================

    /// Ask the instance to cancel
    ///
    /// Waits until the body has begun executing. Returns false when the
    /// instance already completed, was already cancelled, or the workflow's
    /// `on_cancel` hook refused.
    pub async fn cancel(&self) -> Result<bool> {
        if !self.is_started() {
            return Err(WorkflowError::NotStarted(self.id));
        }
        self.signals.wait_executing().await;
        if self.is_complete() {
            return Ok(false);
        }

        let token = self.cancellation_token();
        let _guard = self.cancel_lock.lock();
        if self.is_cancelled() {
            return Ok(false);
        }
        if !self.workflow.on_cancel(self) {
            info!(workflow_id = %self.id, "cancellation refused");
            return Ok(false);
        }

        token.cancel();
        self.mark_cancelled();
        Ok(true)
    }

    fn mark_cancelled(&self) {
        if !self.flags.cancelled.swap(true, Ordering::SeqCst) {
            info!(workflow_id = %self.id, "workflow cancelled");
            self.workflow.on_cancelling(self);
        }
    }

    /// Cancel without consulting the veto hook and stop accepting actions
    pub fn dispose(&self) {
        if let Some(token) = self.cancellation.get() {
            token.cancel();
        }
        if !self.is_started() {
            self.parked.close();
        }
    }

    /// Checkpoint helper over the engine's store
    pub fn store_sync(&self) -> Result<StoreSync> {
        let this: Arc<dyn AnyInstance> = self.handle()?;
        let store = self.engine().and_then(|engine| engine.store());
        Ok(StoreSync::new(store, this))
    }

    // ========================================================================
    // Children
    // ========================================================================

    fn child_context(
        &self,
        extra: impl IntoIterator<Item = Arc<Argument>>,
    ) -> Result<(WorkflowEngine, Arguments, CancellationToken)> {
        let engine = self.engine().ok_or(WorkflowError::NotAvailable(self.id))?;
        let arguments = self.arguments().inheritable().union(extra);
        Ok((engine, arguments, self.cancellation_token().child_token()))
    }

    /// Create and start a child without waiting for it
    ///
    /// The child shares this instance's inheritable arguments (plus `extra`)
    /// and is cancelled with it. Callable from synchronous hooks.
    pub fn spawn_workflow<W: Workflow>(
        &self,
        workflow: W,
        extra: impl IntoIterator<Item = Arc<Argument>>,
    ) -> Result<Arc<WorkflowInstance<W::State>>> {
        let (engine, arguments, token) = self.child_context(extra)?;
        let child = engine.create_child(workflow, self.id);
        child.launch(arguments, None, Some(token))?;
        Ok(child)
    }

    /// Create and start a child, waiting for it to complete
    pub async fn enter_workflow<W: Workflow>(
        &self,
        workflow: W,
        extra: impl IntoIterator<Item = Arc<Argument>>,
    ) -> Result<Arc<WorkflowInstance<W::State>>> {
        let child = self.spawn_workflow(workflow, extra)?;
        child.wait().await?;
        Ok(child)
    }

    /// [`spawn_workflow`](Self::spawn_workflow) for a type-erased definition
    pub fn spawn_dyn(
        &self,
        workflow: &DynWorkflow,
        extra: impl IntoIterator<Item = Arc<Argument>>,
    ) -> Result<Arc<dyn AnyInstance>> {
        let (engine, arguments, token) = self.child_context(extra)?;
        let child = workflow.instantiate(&engine, Uuid::now_v7(), Some(self.id));
        child.launch(arguments, None, Some(token))?;
        Ok(child)
    }

    /// [`enter_workflow`](Self::enter_workflow) for a type-erased definition
    pub async fn enter_dyn(
        &self,
        workflow: &DynWorkflow,
        extra: impl IntoIterator<Item = Arc<Argument>>,
    ) -> Result<Arc<dyn AnyInstance>> {
        let child = self.spawn_dyn(workflow, extra)?;
        child.wait().await?;
        Ok(child)
    }
}

impl<S: StateKey> std::fmt::Debug for WorkflowInstance<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowInstance")
            .field("id", &self.id)
            .field("parent_id", &self.parent_id)
            .field("workflow_type", &self.workflow_type())
            .field("current_state", &self.current_state())
            .field("is_complete", &self.is_complete())
            .finish()
    }
}
