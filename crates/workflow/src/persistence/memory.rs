//! In-memory implementation of WorkflowStore for testing

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use super::store::*;

/// Stored sync record
#[allow(dead_code)] // Fields mirror the PostgreSQL table for debugging
struct SyncRecord {
    parent_id: Option<Uuid>,
    workflow_type: String,
    state: StoreState,
    created_at: DateTime<Utc>,
}

/// In-memory implementation of WorkflowStore
///
/// This is primarily for testing. It stores all data in memory and
/// provides the same semantics as the PostgreSQL implementation.
///
/// # Example
///
/// ```
/// use everruns_workflow::InMemoryWorkflowStore;
///
/// let store = InMemoryWorkflowStore::new();
/// assert_eq!(store.event_count(), 0);
/// ```
pub struct InMemoryWorkflowStore {
    events: RwLock<Vec<StoredEvent>>,
    syncs: RwLock<HashMap<(String, Uuid), SyncRecord>>,
}

impl InMemoryWorkflowStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            syncs: RwLock::new(HashMap::new()),
        }
    }

    /// Get the number of recorded events
    pub fn event_count(&self) -> usize {
        self.events.read().len()
    }

    /// Recorded events of one workflow
    pub fn events_for(&self, workflow_id: Uuid) -> Vec<StoreEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.workflow_id == workflow_id)
            .map(|e| e.event)
            .collect()
    }

    /// Get the number of sync records
    pub fn sync_count(&self) -> usize {
        self.syncs.read().len()
    }

    /// Clear all data (for testing)
    pub fn clear(&self) {
        self.events.write().clear();
        self.syncs.write().clear();
    }
}

impl Default for InMemoryWorkflowStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn initialize(&self, reset: bool) -> Result<(), StoreError> {
        if reset {
            self.clear();
        }
        Ok(())
    }

    async fn store_event(&self, event: &StoredEvent) -> Result<bool, StoreError> {
        let mut events = self.events.write();
        let exists = events
            .iter()
            .any(|e| e.workflow_id == event.workflow_id && e.event == event.event);
        if exists {
            return Ok(false);
        }
        events.push(event.clone());
        Ok(true)
    }

    async fn load_events(&self) -> Result<Vec<StoredEvent>, StoreError> {
        Ok(self.events.read().clone())
    }

    async fn load_sync(
        &self,
        sync_id: &str,
        workflow_id: Uuid,
    ) -> Result<Option<StoreState>, StoreError> {
        Ok(self
            .syncs
            .read()
            .get(&(sync_id.to_string(), workflow_id))
            .map(|record| record.state.clone()))
    }

    async fn insert_sync(
        &self,
        sync_id: &str,
        workflow_id: Uuid,
        parent_id: Option<Uuid>,
        workflow_type: &str,
        state: &StoreState,
    ) -> Result<bool, StoreError> {
        let mut syncs = self.syncs.write();
        let key = (sync_id.to_string(), workflow_id);
        if syncs.contains_key(&key) {
            return Ok(false);
        }
        syncs.insert(
            key,
            SyncRecord {
                parent_id,
                workflow_type: workflow_type.to_string(),
                state: state.clone(),
                created_at: Utc::now(),
            },
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(workflow_id: Uuid, kind: StoreEvent) -> StoredEvent {
        StoredEvent {
            workflow_id,
            parent_id: None,
            workflow_type: "Approval".to_string(),
            event: kind,
            state: StoreState::default(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_store_event_deduplicates() {
        let store = InMemoryWorkflowStore::new();
        let id = Uuid::now_v7();

        assert!(store.store_event(&event(id, StoreEvent::Create)).await.unwrap());
        assert!(!store.store_event(&event(id, StoreEvent::Create)).await.unwrap());
        assert!(store.store_event(&event(id, StoreEvent::Start)).await.unwrap());

        assert_eq!(store.event_count(), 2);
        assert_eq!(
            store.events_for(id),
            vec![StoreEvent::Create, StoreEvent::Start]
        );
    }

    #[tokio::test]
    async fn test_insert_sync_once() {
        let store = InMemoryWorkflowStore::new();
        let id = Uuid::now_v7();
        let state = StoreState {
            state: serde_json::json!("Pending"),
            ..Default::default()
        };

        assert!(store
            .insert_sync("checkpoint", id, None, "Approval", &state)
            .await
            .unwrap());
        assert!(!store
            .insert_sync("checkpoint", id, None, "Approval", &StoreState::default())
            .await
            .unwrap());

        let loaded = store
            .load_sync("checkpoint", id)
            .await
            .unwrap()
            .expect("should have record");
        assert_eq!(loaded.state, serde_json::json!("Pending"));
        assert!(store.load_sync("other", id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_initialize_reset_clears() {
        let store = InMemoryWorkflowStore::new();
        store
            .store_event(&event(Uuid::now_v7(), StoreEvent::Create))
            .await
            .unwrap();

        store.initialize(false).await.unwrap();
        assert_eq!(store.event_count(), 1);

        store.initialize(true).await.unwrap();
        assert_eq!(store.event_count(), 0);
        assert_eq!(store.sync_count(), 0);
    }

    #[test]
    fn test_clear_drops_everything() {
        let store = InMemoryWorkflowStore::new();
        let id = Uuid::now_v7();

        tokio_test::block_on(async {
            store.store_event(&event(id, StoreEvent::Create)).await.unwrap();
            store
                .insert_sync("checkpoint", id, None, "Approval", &StoreState::default())
                .await
                .unwrap();
        });
        assert_eq!(store.event_count(), 1);
        assert_eq!(store.sync_count(), 1);

        store.clear();
        assert!(store.events_for(id).is_empty());
        assert_eq!(store.sync_count(), 0);
    }
}
