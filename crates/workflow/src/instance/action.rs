//! Action delivery and the park/unpark rendezvous
//!
//! The body parks in [`WorkflowInstance::await_action`] by adding one permit
//! to the `parked` semaphore. A delivered action takes the per-instance gate,
//! then a permit, and consumes it only when the action turned out to be legal.
//! An illegal action hands its permit back, so the body stays parked.

use std::sync::atomic::Ordering;

use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use super::signals::PendingAction;
use super::{ActionRequest, WorkflowInstance};
use crate::argument::{Arguments, Value};
use crate::error::{Result, WorkflowError};
use crate::state::{ActionContext, ActionHandler};
use crate::workflow::StateKey;

/// What a legal action does: optionally move, optionally run a handler
struct Resolved<S: StateKey> {
    target: Option<S>,
    handler: Option<ActionHandler<S>>,
}

impl<S: StateKey> WorkflowInstance<S> {
    /// Deliver an action and wait until it has been processed
    ///
    /// Resolution order is the global table, then the current state's table,
    /// then the workflow's action map. Returns the handler's value, or `Null`
    /// for a plain transition. An illegal action fails with
    /// `ActionNotAllowed` and leaves the state unchanged.
    pub async fn action(&self, request: impl Into<ActionRequest>) -> Result<Value> {
        let _pending = PendingAction::begin(&self.signals);
        self.process(request.into()).await
    }

    /// Deliver an action without waiting for it
    ///
    /// The action counts as pending from the moment this returns, so a
    /// following [`wait_action`](Self::wait_action) covers it.
    pub fn action_detached(&self, request: impl Into<ActionRequest>) -> Result<JoinHandle<Result<Value>>> {
        let this = self.handle()?;
        let request = request.into();
        self.signals.begin_pending();
        Ok(tokio::spawn(async move {
            let _pending = PendingAction::adopt(&this.signals);
            this.process(request).await
        }))
    }

    /// Wait until no action is pending or in flight
    pub async fn wait_action(&self) {
        self.signals.wait_idle().await
    }

    #[instrument(skip(self, request), fields(workflow_id = %self.id, action = %request.name()))]
    async fn process(&self, request: ActionRequest) -> Result<Value> {
        if !self.is_started() {
            return Err(WorkflowError::NotStarted(self.id));
        }
        self.signals.wait_ready().await;

        let _gate = self.gate.lock().await;
        let permit = self
            .parked
            .acquire()
            .await
            .map_err(|_| WorkflowError::NotAvailable(self.id))?;
        if self.is_complete() {
            return Err(WorkflowError::NotAvailable(self.id));
        }

        let mut visible = self.arguments();
        visible.extend(request.action_arguments().iter().cloned());
        let Some(resolved) = self.resolve(request.name(), request.tag_name(), &visible) else {
            warn!(state = %self.state_label(), tag = ?request.tag_name(), "action not allowed");
            return Err(WorkflowError::ActionNotAllowed {
                action: request.name().to_string(),
                state: self.state_label(),
            });
        };
        permit.forget();

        debug!("processing action");
        self.flags.in_action.store(true, Ordering::SeqCst);
        *self.action_arguments.write() = request.action_arguments().clone();

        let result = self.dispatch(resolved, request).await;

        *self.action_arguments.write() = Arguments::new();
        self.flags.in_action.store(false, Ordering::SeqCst);
        if let Err(e) = &result {
            if !e.is_cancelled() {
                self.fail(e);
            }
        }
        self.signals.finish_action();
        result
    }

    fn resolve(&self, action: &str, tag: Option<&str>, arguments: &Arguments) -> Option<Resolved<S>> {
        let current = self.current_state();
        let machine = self.machine.lock();

        if let Some(rule) = machine
            .global_state()
            .rule(action)
            .filter(|rule| rule.permits(tag, arguments))
        {
            return Some(Resolved {
                target: None,
                handler: rule.handler.clone(),
            });
        }

        if let Some(rule) = current
            .as_ref()
            .and_then(|state| machine.get(state))
            .and_then(|state| state.rule(action))
            .filter(|rule| rule.permits(tag, arguments))
        {
            return Some(Resolved {
                target: rule.target.clone(),
                handler: rule.handler.clone(),
            });
        }

        machine.action_map().handler(action).map(|handler| Resolved {
            target: None,
            handler: Some(handler),
        })
    }

    async fn dispatch(&self, resolved: Resolved<S>, request: ActionRequest) -> Result<Value> {
        if let Some(target) = resolved.target {
            self.set_state(target)?;
        }
        match resolved.handler {
            Some(handler) => {
                let ActionRequest {
                    name,
                    tag,
                    arguments,
                } = request;
                handler(ActionContext::new(self.handle()?, name, tag, arguments)).await
            }
            None => Ok(Value::Null),
        }
    }

    /// Park the body until an action has been processed
    ///
    /// With `wait_for_exit_state` the instance keeps parking until it reaches
    /// an exit state. Returns `Cancelled` once the cancellation token fires.
    pub async fn await_action(&self, wait_for_exit_state: bool) -> Result<()> {
        let token = self.cancellation_token();
        loop {
            if wait_for_exit_state && self.is_exit_state() {
                return Ok(());
            }

            let mut finished = self.signals.subscribe_actions();
            self.parked.add_permits(1);
            let outcome = tokio::select! {
                changed = finished.changed() => {
                    changed.map_err(|_| WorkflowError::NotAvailable(self.id))
                }
                _ = token.cancelled() => Err(WorkflowError::Cancelled),
            };
            self.reclaim_park();
            outcome?;

            if !wait_for_exit_state || self.is_exit_state() {
                return Ok(());
            }
        }
    }

    /// Take back a park permit no action consumed
    fn reclaim_park(&self) {
        if let Ok(permit) = self.parked.try_acquire() {
            permit.forget();
        }
    }

    /// Legal actions for the current state, including global ones
    pub async fn allowed_actions(&self, tag: Option<&str>) -> Result<Vec<String>> {
        self.allowed_actions_with(tag, true).await
    }

    /// Legal actions for the current state and tag
    ///
    /// Blocks until the instance finished its one-time setup.
    pub async fn allowed_actions_with(&self, tag: Option<&str>, include_global: bool) -> Result<Vec<String>> {
        if !self.is_started() {
            return Err(WorkflowError::NotStarted(self.id));
        }
        self.signals.wait_ready().await;

        let arguments = self.arguments();
        let current = self.current_state();
        let machine = self.machine.lock();

        let mut actions = current
            .as_ref()
            .and_then(|state| machine.get(state))
            .map(|state| state.allowed_actions(tag, &arguments))
            .unwrap_or_default();
        if include_global {
            for action in machine.global_state().allowed_actions(tag, &arguments) {
                if !actions.contains(&action) {
                    actions.push(action);
                }
            }
        }
        Ok(actions)
    }
}
