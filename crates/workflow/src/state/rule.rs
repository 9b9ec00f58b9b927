//! Action rules and handler plumbing

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::argument::{Argument, Arguments, FromValue, Value};
use crate::error::Result;
use crate::instance::WorkflowInstance;
use crate::workflow::StateKey;

/// Guard evaluated against the instance's arguments
pub type Condition = Arc<dyn Fn(&Arguments) -> bool + Send + Sync>;

/// Type-erased action handler
pub type ActionHandler<S> =
    Arc<dyn Fn(ActionContext<S>) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Hook run when a state is entered or left
pub type StateHook<S> = Arc<dyn Fn(&WorkflowInstance<S>) -> Result<()> + Send + Sync>;

/// What a handler sees while its action is being processed
pub struct ActionContext<S: StateKey> {
    instance: Arc<WorkflowInstance<S>>,
    action: String,
    tag: Option<String>,
    arguments: Arguments,
}

impl<S: StateKey> Clone for ActionContext<S> {
    fn clone(&self) -> Self {
        Self {
            instance: self.instance.clone(),
            action: self.action.clone(),
            tag: self.tag.clone(),
            arguments: self.arguments.clone(),
        }
    }
}

impl<S: StateKey> ActionContext<S> {
    pub(crate) fn new(
        instance: Arc<WorkflowInstance<S>>,
        action: String,
        tag: Option<String>,
        arguments: Arguments,
    ) -> Self {
        Self {
            instance,
            action,
            tag,
            arguments,
        }
    }

    /// The instance the action was delivered to
    pub fn instance(&self) -> &Arc<WorkflowInstance<S>> {
        &self.instance
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Arguments supplied with this action only
    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    pub fn argument(&self, name: &str) -> Option<&Arc<Argument>> {
        self.arguments.get(name)
    }

    /// Read an action argument; missing arguments read like `Null`
    pub fn value<T: FromValue>(&self, name: &str) -> Result<T> {
        self.arguments.value(name)
    }
}

pub(crate) fn sync_handler<S, F, R>(handler: F) -> ActionHandler<S>
where
    S: StateKey,
    F: Fn(&ActionContext<S>) -> Result<R> + Send + Sync + 'static,
    R: Into<Value>,
{
    Arc::new(move |ctx: ActionContext<S>| {
        let result = handler(&ctx).map(Into::into);
        futures::future::ready(result).boxed()
    })
}

pub(crate) fn async_handler<S, F, Fut, R>(handler: F) -> ActionHandler<S>
where
    S: StateKey,
    F: Fn(ActionContext<S>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
    R: Into<Value>,
{
    Arc::new(move |ctx: ActionContext<S>| {
        let fut = handler(ctx);
        async move { fut.await.map(Into::into) }.boxed()
    })
}

/// One entry of a state's action table
///
/// A rule without a target keeps the instance in its current state.
///
/// ```ignore
/// state.allow_rule(
///     ActionRule::new("Call Dialed")
///         .to(PhoneState::Ringing)
///         .when(|args| args.value::<bool>("CanDial").unwrap_or(false)),
/// )?;
/// ```
pub struct ActionRule<S: StateKey> {
    pub(crate) action: String,
    pub(crate) target: Option<S>,
    pub(crate) condition: Option<Condition>,
    pub(crate) tag: Option<String>,
    pub(crate) handler: Option<ActionHandler<S>>,
}

impl<S: StateKey> Clone for ActionRule<S> {
    fn clone(&self) -> Self {
        Self {
            action: self.action.clone(),
            target: self.target.clone(),
            condition: self.condition.clone(),
            tag: self.tag.clone(),
            handler: self.handler.clone(),
        }
    }
}

impl<S: StateKey> ActionRule<S> {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            target: None,
            condition: None,
            tag: None,
            handler: None,
        }
    }

    /// Transition to `target` when the action fires
    pub fn to(mut self, target: S) -> Self {
        self.target = Some(target);
        self
    }

    /// Only allow the action while `condition` holds
    pub fn when<F>(mut self, condition: F) -> Self
    where
        F: Fn(&Arguments) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Arc::new(condition));
        self
    }

    /// Only allow the action when delivered with this tag
    pub fn tagged(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn handler<F, R>(mut self, handler: F) -> Self
    where
        F: Fn(&ActionContext<S>) -> Result<R> + Send + Sync + 'static,
        R: Into<Value>,
    {
        self.handler = Some(sync_handler(handler));
        self
    }

    pub fn async_handler<F, Fut, R>(mut self, handler: F) -> Self
    where
        F: Fn(ActionContext<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
        R: Into<Value>,
    {
        self.handler = Some(async_handler(handler));
        self
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn target(&self) -> Option<&S> {
        self.target.as_ref()
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Tag must match exactly (or both be absent) and the guard must hold
    pub fn permits(&self, tag: Option<&str>, arguments: &Arguments) -> bool {
        let tag_matches = self.tag.as_deref() == tag;
        tag_matches && self.condition.as_ref().map_or(true, |c| c(arguments))
    }
}

impl<S: StateKey> fmt::Debug for ActionRule<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRule")
            .field("action", &self.action)
            .field("target", &self.target)
            .field("tag", &self.tag)
            .field("has_condition", &self.condition.is_some())
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}
