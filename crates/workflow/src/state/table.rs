//! Per-state and global action tables

use std::future::Future;
use std::sync::Arc;

use super::rule::{ActionHandler, ActionRule, StateHook};
use super::ActionContext;
use crate::argument::{Arguments, Value};
use crate::error::{Result, WorkflowError};
use crate::instance::WorkflowInstance;
use crate::workflow::StateKey;

/// Ordered rules with unique action names
pub(crate) struct RuleTable<S: StateKey> {
    owner: String,
    rules: Vec<ActionRule<S>>,
}

impl<S: StateKey> RuleTable<S> {
    fn new(owner: String) -> Self {
        Self {
            owner,
            rules: Vec::new(),
        }
    }

    fn insert(&mut self, rule: ActionRule<S>) -> Result<()> {
        if self.find(&rule.action).is_some() {
            return Err(WorkflowError::DuplicateAction {
                action: rule.action,
                state: self.owner.clone(),
            });
        }
        self.rules.push(rule);
        Ok(())
    }

    fn remove(&mut self, action: &str) -> bool {
        let before = self.rules.len();
        self.rules.retain(|r| r.action != action);
        self.rules.len() != before
    }

    fn find(&self, action: &str) -> Option<&ActionRule<S>> {
        self.rules.iter().find(|r| r.action == action)
    }

    fn allows(&self, action: &str, tag: Option<&str>, arguments: &Arguments) -> bool {
        self.find(action)
            .is_some_and(|r| r.permits(tag, arguments))
    }

    fn allowed(&self, tag: Option<&str>, arguments: &Arguments) -> Vec<String> {
        self.rules
            .iter()
            .filter(|r| r.permits(tag, arguments))
            .map(|r| r.action.clone())
            .collect()
    }
}

// ============================================================================
// WorkflowState
// ============================================================================

/// Action table and lifecycle hooks for one state
pub struct WorkflowState<S: StateKey> {
    state: S,
    table: RuleTable<S>,
    exit: bool,
    entered: bool,
    on_enter_first_time: Option<StateHook<S>>,
    on_enter: Option<StateHook<S>>,
    on_exit: Option<StateHook<S>>,
}

impl<S: StateKey> std::fmt::Debug for WorkflowState<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowState")
            .field("state", &self.state)
            .field("exit", &self.exit)
            .field("entered", &self.entered)
            .finish_non_exhaustive()
    }
}

impl<S: StateKey> WorkflowState<S> {
    pub fn new(state: S) -> Self {
        Self {
            table: RuleTable::new(format!("{state:?}")),
            state,
            exit: false,
            entered: false,
            on_enter_first_time: None,
            on_enter: None,
            on_exit: None,
        }
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    /// Register a rule; a second rule for the same action is an error
    pub fn allow_rule(&mut self, rule: ActionRule<S>) -> Result<&mut Self> {
        self.table.insert(rule)?;
        Ok(self)
    }

    pub fn allow(&mut self, action: impl Into<String>, target: S) -> Result<&mut Self> {
        self.allow_rule(ActionRule::new(action).to(target))
    }

    pub fn allow_tagged(
        &mut self,
        action: impl Into<String>,
        target: S,
        tag: impl Into<String>,
    ) -> Result<&mut Self> {
        self.allow_rule(ActionRule::new(action).to(target).tagged(tag))
    }

    pub fn allow_on_condition<F>(
        &mut self,
        action: impl Into<String>,
        target: S,
        condition: F,
    ) -> Result<&mut Self>
    where
        F: Fn(&Arguments) -> bool + Send + Sync + 'static,
    {
        self.allow_rule(ActionRule::new(action).to(target).when(condition))
    }

    pub fn allow_with_handler<F, R>(
        &mut self,
        action: impl Into<String>,
        target: S,
        handler: F,
    ) -> Result<&mut Self>
    where
        F: Fn(&ActionContext<S>) -> Result<R> + Send + Sync + 'static,
        R: Into<Value>,
    {
        self.allow_rule(ActionRule::new(action).to(target).handler(handler))
    }

    pub fn allow_with_async_handler<F, Fut, R>(
        &mut self,
        action: impl Into<String>,
        target: S,
        handler: F,
    ) -> Result<&mut Self>
    where
        F: Fn(ActionContext<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
        R: Into<Value>,
    {
        self.allow_rule(ActionRule::new(action).to(target).async_handler(handler))
    }

    /// Retract a rule; returns whether one was registered
    pub fn remove(&mut self, action: &str) -> bool {
        self.table.remove(action)
    }

    /// Mark this state as terminal for the state machine
    pub fn set_exit_state(&mut self) -> &mut Self {
        self.exit = true;
        self
    }

    pub fn is_exit_state(&self) -> bool {
        self.exit
    }

    /// Whether the owning instance ever entered this state
    pub fn has_entered(&self) -> bool {
        self.entered
    }

    pub fn on_enter_first_time<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&WorkflowInstance<S>) -> Result<()> + Send + Sync + 'static,
    {
        self.on_enter_first_time = Some(Arc::new(hook));
        self
    }

    pub fn on_enter<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&WorkflowInstance<S>) -> Result<()> + Send + Sync + 'static,
    {
        self.on_enter = Some(Arc::new(hook));
        self
    }

    pub fn on_exit<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&WorkflowInstance<S>) -> Result<()> + Send + Sync + 'static,
    {
        self.on_exit = Some(Arc::new(hook));
        self
    }

    pub fn rule(&self, action: &str) -> Option<&ActionRule<S>> {
        self.table.find(action)
    }

    pub fn allows(&self, action: &str, tag: Option<&str>, arguments: &Arguments) -> bool {
        self.table.allows(action, tag, arguments)
    }

    /// State the action leads to, or `ActionNotAllowed`
    pub fn outcome(&self, action: &str, tag: Option<&str>, arguments: &Arguments) -> Result<S> {
        match self.table.find(action) {
            Some(rule) if rule.permits(tag, arguments) => {
                Ok(rule.target.clone().unwrap_or_else(|| self.state.clone()))
            }
            _ => Err(WorkflowError::ActionNotAllowed {
                action: action.to_string(),
                state: self.table.owner.clone(),
            }),
        }
    }

    pub fn allowed_actions(&self, tag: Option<&str>, arguments: &Arguments) -> Vec<String> {
        self.table.allowed(tag, arguments)
    }

    pub(crate) fn exit_hook(&self) -> Option<StateHook<S>> {
        self.on_exit.clone()
    }

    /// Mark entered and hand back the hooks to run, first-time hook first
    pub(crate) fn enter(&mut self) -> (Option<StateHook<S>>, Option<StateHook<S>>) {
        let first = if self.entered {
            None
        } else {
            self.entered = true;
            self.on_enter_first_time.clone()
        };
        (first, self.on_enter.clone())
    }
}

// ============================================================================
// GlobalState
// ============================================================================

/// Actions valid regardless of the current state
///
/// Global rules never change the current state; a rule's target is ignored.
pub struct GlobalState<S: StateKey> {
    table: RuleTable<S>,
}

impl<S: StateKey> Default for GlobalState<S> {
    fn default() -> Self {
        Self {
            table: RuleTable::new("global".to_string()),
        }
    }
}

impl<S: StateKey> GlobalState<S> {
    pub fn allow_rule(&mut self, rule: ActionRule<S>) -> Result<&mut Self> {
        self.table.insert(ActionRule { target: None, ..rule })?;
        Ok(self)
    }

    pub fn allow(&mut self, action: impl Into<String>) -> Result<&mut Self> {
        self.allow_rule(ActionRule::new(action))
    }

    pub fn allow_tagged(
        &mut self,
        action: impl Into<String>,
        tag: impl Into<String>,
    ) -> Result<&mut Self> {
        self.allow_rule(ActionRule::new(action).tagged(tag))
    }

    pub fn allow_on_condition<F>(&mut self, action: impl Into<String>, condition: F) -> Result<&mut Self>
    where
        F: Fn(&Arguments) -> bool + Send + Sync + 'static,
    {
        self.allow_rule(ActionRule::new(action).when(condition))
    }

    pub fn allow_with_handler<F, R>(&mut self, action: impl Into<String>, handler: F) -> Result<&mut Self>
    where
        F: Fn(&ActionContext<S>) -> Result<R> + Send + Sync + 'static,
        R: Into<Value>,
    {
        self.allow_rule(ActionRule::new(action).handler(handler))
    }

    pub fn allow_with_async_handler<F, Fut, R>(
        &mut self,
        action: impl Into<String>,
        handler: F,
    ) -> Result<&mut Self>
    where
        F: Fn(ActionContext<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
        R: Into<Value>,
    {
        self.allow_rule(ActionRule::new(action).async_handler(handler))
    }

    pub fn remove(&mut self, action: &str) -> bool {
        self.table.remove(action)
    }

    pub fn rule(&self, action: &str) -> Option<&ActionRule<S>> {
        self.table.find(action)
    }

    pub fn allows(&self, action: &str, tag: Option<&str>, arguments: &Arguments) -> bool {
        self.table.allows(action, tag, arguments)
    }

    pub fn allowed_actions(&self, tag: Option<&str>, arguments: &Arguments) -> Vec<String> {
        self.table.allowed(tag, arguments)
    }

    pub fn is_empty(&self) -> bool {
        self.table.rules.is_empty()
    }
}

/// Explicit `{action name: handler}` map declared by a workflow
///
/// Consulted last, after the current state and the global table. Entries
/// carry no guard or tag.
pub struct ActionMap<S: StateKey> {
    handlers: Vec<(String, ActionHandler<S>)>,
}

impl<S: StateKey> Default for ActionMap<S> {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }
}

impl<S: StateKey> ActionMap<S> {
    pub fn on<F, R>(&mut self, action: impl Into<String>, handler: F) -> Result<&mut Self>
    where
        F: Fn(&ActionContext<S>) -> Result<R> + Send + Sync + 'static,
        R: Into<Value>,
    {
        self.insert(action.into(), super::rule::sync_handler(handler))
    }

    pub fn on_async<F, Fut, R>(&mut self, action: impl Into<String>, handler: F) -> Result<&mut Self>
    where
        F: Fn(ActionContext<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
        R: Into<Value>,
    {
        self.insert(action.into(), super::rule::async_handler(handler))
    }

    fn insert(&mut self, action: String, handler: ActionHandler<S>) -> Result<&mut Self> {
        if self.contains(&action) {
            return Err(WorkflowError::DuplicateAction {
                action,
                state: "workflow".to_string(),
            });
        }
        self.handlers.push((action, handler));
        Ok(self)
    }

    pub fn contains(&self, action: &str) -> bool {
        self.handlers.iter().any(|(name, _)| name == action)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.iter().map(|(name, _)| name.as_str())
    }

    pub(crate) fn handler(&self, action: &str) -> Option<ActionHandler<S>> {
        self.handlers
            .iter()
            .find(|(name, _)| name == action)
            .map(|(_, handler)| handler.clone())
    }
}
