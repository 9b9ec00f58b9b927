//! Workflow instances
//!
//! A [`WorkflowInstance`] drives one [`Workflow`](crate::workflow::Workflow)
//! definition at runtime:
//! - `start` merges arguments and schedules the body on the tokio runtime
//! - `await_action` parks the body until an action has been processed
//! - `action` delivers one action at a time, serialized per instance
//! - `wait`, `wait_action` and `cancel` coordinate with external callers
//!
//! [`AnyInstance`] is the object-safe view the engine keeps in its registry.

mod action;
mod any;
mod runtime;
mod signals;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

pub use any::AnyInstance;
pub use runtime::WorkflowInstance;

use crate::argument::{Argument, Arguments};
use crate::workflow::StateKey;

/// Options for [`WorkflowInstance::start_with`]
#[derive(Debug, Clone)]
pub struct StartOptions<S: StateKey> {
    pub arguments: Arguments,
    /// Return only once the instance completed
    pub synchronous: bool,
    /// Overrides the configured initial state
    pub initial_state: Option<S>,
    /// Token to cancel under; a fresh one when absent
    pub cancellation: Option<CancellationToken>,
}

impl<S: StateKey> Default for StartOptions<S> {
    fn default() -> Self {
        Self {
            arguments: Arguments::new(),
            synchronous: false,
            initial_state: None,
            cancellation: None,
        }
    }
}

impl<S: StateKey> StartOptions<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn argument(mut self, argument: Arc<Argument>) -> Self {
        self.arguments.insert(argument);
        self
    }

    pub fn arguments(mut self, arguments: impl IntoIterator<Item = Arc<Argument>>) -> Self {
        self.arguments.extend(arguments);
        self
    }

    pub fn synchronous(mut self, synchronous: bool) -> Self {
        self.synchronous = synchronous;
        self
    }

    pub fn initial_state(mut self, state: S) -> Self {
        self.initial_state = Some(state);
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

/// A named action delivered to an instance
#[derive(Debug, Clone, Default)]
pub struct ActionRequest {
    name: String,
    tag: Option<String>,
    arguments: Arguments,
}

impl ActionRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: None,
            arguments: Arguments::new(),
        }
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Argument visible to the handler of this action only
    pub fn argument(mut self, argument: Arc<Argument>) -> Self {
        self.arguments.insert(argument);
        self
    }

    pub fn arguments(mut self, arguments: impl IntoIterator<Item = Arc<Argument>>) -> Self {
        self.arguments.extend(arguments);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag_name(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn action_arguments(&self) -> &Arguments {
        &self.arguments
    }
}

impl From<&str> for ActionRequest {
    fn from(name: &str) -> Self {
        ActionRequest::new(name)
    }
}

impl From<String> for ActionRequest {
    fn from(name: String) -> Self {
        ActionRequest::new(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_request_builder() {
        let request = ActionRequest::new("Assign")
            .tag("ops")
            .argument(Argument::new("AssignTo", "dana"));

        assert_eq!(request.name(), "Assign");
        assert_eq!(request.tag_name(), Some("ops"));
        assert_eq!(
            request
                .action_arguments()
                .value::<String>("AssignTo")
                .expect("should read"),
            "dana"
        );

        let plain: ActionRequest = "Approve".into();
        assert_eq!(plain.tag_name(), None);
        assert!(plain.action_arguments().is_empty());
    }

    #[test]
    fn test_start_options_builder() {
        let options = StartOptions::<u8>::new()
            .argument(Argument::new("Count", 1))
            .synchronous(true)
            .initial_state(3);

        assert!(options.synchronous);
        assert_eq!(options.initial_state, Some(3));
        assert_eq!(options.arguments.len(), 1);
        assert!(options.cancellation.is_none());
    }
}
