//! Serializable snapshots of instances and lifecycle events

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::argument::Value;
use crate::instance::AnyInstance;
use crate::persistence::StoreEvent;

/// One argument as reported to outside callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgumentDescriptor {
    pub name: String,
    /// Kind of the stored value, e.g. `int` or `string`
    pub kind: String,
    pub value: Value,
}

/// Point-in-time view of an instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDescriptor {
    pub workflow_id: Uuid,
    pub parent_workflow_id: Option<Uuid>,
    pub workflow_type: String,
    /// Current state as JSON, `null` without one
    pub current_state: serde_json::Value,
    pub arguments: Vec<ArgumentDescriptor>,
    pub is_started: bool,
    pub is_running: bool,
    pub is_complete: bool,
    pub is_cancelled: bool,
    pub is_in_action: bool,
    pub is_in_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowDescriptor {
    pub fn of<I: AnyInstance + ?Sized>(instance: &I) -> Self {
        let arguments = instance
            .arguments()
            .iter()
            .map(|argument| {
                let value = argument.value();
                ArgumentDescriptor {
                    name: argument.name().to_string(),
                    kind: value.kind().to_string(),
                    value,
                }
            })
            .collect();

        Self {
            workflow_id: instance.id(),
            parent_workflow_id: instance.parent_id(),
            workflow_type: instance.workflow_type(),
            current_state: instance.state_json(),
            arguments,
            is_started: instance.is_started(),
            is_running: instance.is_running(),
            is_complete: instance.is_complete(),
            is_cancelled: instance.is_cancelled(),
            is_in_action: instance.is_in_action(),
            is_in_error: instance.is_in_error(),
            error: instance.error(),
        }
    }
}

/// Broadcast by the engine when an instance starts, completes or fails
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub workflow_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub workflow_type: String,
    pub event: StoreEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LifecycleEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self.event, StoreEvent::Complete | StoreEvent::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_event_serialization() {
        let event = LifecycleEvent {
            workflow_id: Uuid::nil(),
            parent_id: None,
            workflow_type: "Approval".to_string(),
            event: StoreEvent::Complete,
            error: None,
        };

        let json = serde_json::to_value(&event).expect("should serialize");
        assert_eq!(json["event"], "complete");
        assert!(json.get("error").is_none());
        assert!(event.is_terminal());
    }
}
