//! WorkflowStore trait definition

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::argument::{Argument, Arguments, Value};
use crate::engine::WorkflowEngine;
use crate::error::WorkflowError;
use crate::instance::AnyInstance;
use crate::workflow::LoadBehavior;

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A stored snapshot could not be applied to an instance
    #[error("failed to apply stored state to workflow {workflow_id}: {reason}")]
    Apply { workflow_id: Uuid, reason: String },
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Lifecycle events recorded per instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreEvent {
    Create,
    Start,
    Complete,
    Error,
}

impl StoreEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Start => "start",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(Self::Create),
            "start" => Some(Self::Start),
            "complete" => Some(Self::Complete),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for StoreEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serialized snapshot of an instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreState {
    /// Current state as JSON, `null` without one
    #[serde(default)]
    pub state: serde_json::Value,

    #[serde(default)]
    pub arguments: BTreeMap<String, Value>,

    /// Parameters the type registry needs to recreate the workflow
    #[serde(default)]
    pub parameters: serde_json::Value,
}

impl StoreState {
    /// Non-null arguments as fresh argument cells
    pub fn to_arguments(&self) -> Arguments {
        self.arguments
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(name, value)| Argument::new(name.clone(), value.clone()))
            .collect()
    }
}

/// One recorded lifecycle event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub workflow_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub workflow_type: String,
    pub event: StoreEvent,
    pub state: StoreState,
    pub created_at: DateTime<Utc>,
}

impl StoredEvent {
    /// Snapshot `instance` for `event`
    pub fn capture<I: AnyInstance + ?Sized>(event: StoreEvent, instance: &I) -> Self {
        Self {
            workflow_id: instance.id(),
            parent_id: instance.parent_id(),
            workflow_type: instance.workflow_type(),
            event,
            state: instance.store_state(),
            created_at: Utc::now(),
        }
    }
}

/// Persistence collaborator of the engine
///
/// Implementations must provide the same semantics:
/// - at most one event per (workflow, event kind); repeats are ignored
/// - at most one sync record per (sync id, workflow)
#[async_trait]
pub trait WorkflowStore: Send + Sync + 'static {
    /// Prepare storage; `reset` drops everything recorded so far
    async fn initialize(&self, reset: bool) -> Result<(), StoreError>;

    /// Record a lifecycle event; returns false for a duplicate
    async fn store_event(&self, event: &StoredEvent) -> Result<bool, StoreError>;

    /// Every recorded event, oldest first
    async fn load_events(&self) -> Result<Vec<StoredEvent>, StoreError>;

    /// Stored snapshot for `(sync_id, workflow_id)`, if any
    async fn load_sync(&self, sync_id: &str, workflow_id: Uuid)
        -> Result<Option<StoreState>, StoreError>;

    /// Insert a sync record unless one exists; returns false if it existed
    async fn insert_sync(
        &self,
        sync_id: &str,
        workflow_id: Uuid,
        parent_id: Option<Uuid>,
        workflow_type: &str,
        state: &StoreState,
    ) -> Result<bool, StoreError>;

    /// Reconcile an instance with its sync record
    ///
    /// Returns true when a record already existed, applying it to the
    /// instance when `apply` is set. Otherwise creates one from the instance
    /// when `create` is set and returns false.
    async fn sync_state(
        &self,
        sync_id: &str,
        instance: &dyn AnyInstance,
        create: bool,
        apply: bool,
    ) -> Result<bool, StoreError> {
        let workflow_id = instance.id();
        if let Some(stored) = self.load_sync(sync_id, workflow_id).await? {
            if apply {
                apply_state(instance, &stored)?;
            }
            return Ok(true);
        }
        if !create {
            return Ok(false);
        }

        let inserted = self
            .insert_sync(
                sync_id,
                workflow_id,
                instance.parent_id(),
                &instance.workflow_type(),
                &instance.store_state(),
            )
            .await?;
        debug!(%workflow_id, sync_id, inserted, "created sync record");
        Ok(!inserted)
    }

    /// Recreate and restart every unfinished instance
    ///
    /// Instances that recorded completion or an error are skipped, as are those whose
    /// workflow asks to be bypassed on load. Restarted instances resume in
    /// the state and with the arguments recorded when they started. An
    /// instance that was created but never started is registered again
    /// without being started, and is not part of the returned ids.
    async fn load_from_store(&self, engine: &WorkflowEngine) -> Result<Vec<Uuid>, WorkflowError> {
        let mut grouped: HashMap<Uuid, Vec<StoredEvent>> = HashMap::new();
        let mut order = Vec::new();
        for event in self.load_events().await? {
            if !grouped.contains_key(&event.workflow_id) {
                order.push(event.workflow_id);
            }
            grouped.entry(event.workflow_id).or_default().push(event);
        }

        let mut restored = Vec::new();
        for workflow_id in order {
            let Some(events) = grouped.remove(&workflow_id) else {
                continue;
            };
            let find = |kind: StoreEvent| events.iter().find(|e| e.event == kind);
            if find(StoreEvent::Complete).or_else(|| find(StoreEvent::Error)).is_some() {
                continue;
            }
            let Some(created) = find(StoreEvent::Create) else {
                continue;
            };

            let workflow = match engine
                .workflow_from_type(&created.workflow_type, created.state.parameters.clone())
            {
                Ok(workflow) => workflow,
                Err(e) => {
                    warn!(%workflow_id, error = %e, "cannot recreate stored workflow");
                    continue;
                }
            };
            if workflow.load_behavior() == LoadBehavior::Bypass {
                debug!(%workflow_id, "bypassing stored workflow");
                continue;
            }

            let instance = engine.create_dyn_with_id(&workflow, workflow_id, created.parent_id);
            let Some(started) = find(StoreEvent::Start) else {
                continue;
            };
            instance.launch(
                started.state.to_arguments(),
                Some(started.state.state.clone()),
                None,
            )?;
            info!(%workflow_id, workflow_type = %created.workflow_type, "restored workflow");
            restored.push(workflow_id);
        }
        Ok(restored)
    }
}

fn apply_state(instance: &dyn AnyInstance, stored: &StoreState) -> Result<(), StoreError> {
    instance
        .apply_store_state(stored)
        .map_err(|e| StoreError::Apply {
            workflow_id: instance.id(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_event_names() {
        for event in [
            StoreEvent::Create,
            StoreEvent::Start,
            StoreEvent::Complete,
            StoreEvent::Error,
        ] {
            assert_eq!(StoreEvent::parse(event.as_str()), Some(event));
            assert_eq!(event.to_string(), event.as_str());
        }
        assert_eq!(StoreEvent::parse("unknown"), None);
    }

    #[test]
    fn test_store_state_is_flat_json() {
        let mut arguments = BTreeMap::new();
        arguments.insert("Count".to_string(), Value::Int(2));
        arguments.insert("Missing".to_string(), Value::Null);
        let state = StoreState {
            state: serde_json::json!("Assigned"),
            arguments,
            parameters: serde_json::Value::Null,
        };

        let json = serde_json::to_value(&state).expect("should serialize");
        assert_eq!(json["state"], "Assigned");
        assert_eq!(json["arguments"]["Count"], 2);

        let restored = state.to_arguments();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored.value::<i64>("Count").expect("should read"), 2);
    }
}
