//! Error types for the workflow runtime

use thiserror::Error;
use uuid::Uuid;

use crate::engine::RegistryError;
use crate::persistence::StoreError;

/// Result alias used throughout the crate
pub type Result<T, E = WorkflowError> = std::result::Result<T, E>;

/// Errors surfaced by workflow instances, the engine and handlers
///
/// Contract violations (double start, illegal actions, unknown arguments) are
/// returned to the caller that made the request. `Execution` failures raised
/// inside a workflow body or handler move the instance into its error state.
/// `Cancelled` is how suspension points unwind after an accepted cancellation;
/// it never marks an instance as failed.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// `start` was called on an instance that already started
    #[error("workflow already started: {0}")]
    AlreadyStarted(Uuid),

    /// The operation requires a started instance
    #[error("workflow not started: {0}")]
    NotStarted(Uuid),

    /// The instance completed or was disposed before the request could be served
    #[error("workflow no longer available: {0}")]
    NotAvailable(Uuid),

    /// The action is not legal for the current state and tag
    #[error("action '{action}' not allowed in state {state}")]
    ActionNotAllowed { action: String, state: String },

    /// Two rules were registered for the same action on one state
    #[error("action '{action}' already registered for state {state}")]
    DuplicateAction { action: String, state: String },

    /// A stored value could not be coerced to the requested type
    #[error("cannot convert {found} to {expected}")]
    TypeMismatch {
        expected: &'static str,
        found: String,
    },

    /// No argument with that name exists on the instance
    #[error("argument not found: {0}")]
    ArgumentNotFound(String),

    /// A workflow instance with the same id exists with a different state type
    #[error("workflow {0} exists with a different state type")]
    InstanceTypeMismatch(Uuid),

    /// The surrounding cancellation token fired
    #[error("workflow cancelled")]
    Cancelled,

    /// Failure raised by workflow code
    #[error("execution failed: {0}")]
    Execution(#[from] anyhow::Error),

    /// Persistence collaborator failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Workflow type registry failure
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Serialization failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WorkflowError {
    /// Build an execution failure from a message
    pub fn execution(message: impl std::fmt::Display) -> Self {
        WorkflowError::Execution(anyhow::anyhow!("{message}"))
    }

    /// Whether this error is the result of cancellation rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WorkflowError::Cancelled)
    }

    /// Whether this error reports misuse of the instance contract
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            WorkflowError::AlreadyStarted(_)
                | WorkflowError::NotStarted(_)
                | WorkflowError::NotAvailable(_)
                | WorkflowError::ActionNotAllowed { .. }
                | WorkflowError::DuplicateAction { .. }
                | WorkflowError::TypeMismatch { .. }
                | WorkflowError::ArgumentNotFound(_)
                | WorkflowError::InstanceTypeMismatch(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WorkflowError::ActionNotAllowed {
            action: "Print".to_string(),
            state: "Offline".to_string(),
        };
        assert_eq!(err.to_string(), "action 'Print' not allowed in state Offline");

        let err = WorkflowError::execution("boom");
        assert_eq!(err.to_string(), "execution failed: boom");
    }

    #[test]
    fn test_error_classification() {
        assert!(WorkflowError::Cancelled.is_cancelled());
        assert!(!WorkflowError::Cancelled.is_contract_violation());
        assert!(WorkflowError::AlreadyStarted(Uuid::nil()).is_contract_violation());
        assert!(!WorkflowError::execution("boom").is_contract_violation());
    }
}
