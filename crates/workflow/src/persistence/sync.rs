//! Checkpoint helper bound to one instance

use std::sync::Arc;

use super::store::{StoreError, WorkflowStore};
use crate::instance::AnyInstance;

/// Sync records for one instance through its engine's store
///
/// A sync id names a checkpoint inside a workflow body. On the first run the
/// checkpoint is recorded; after a reload the recorded snapshot tells the
/// body the checkpoint was already passed.
pub struct StoreSync {
    store: Option<Arc<dyn WorkflowStore>>,
    instance: Arc<dyn AnyInstance>,
}

impl StoreSync {
    pub fn new(store: Option<Arc<dyn WorkflowStore>>, instance: Arc<dyn AnyInstance>) -> Self {
        Self { store, instance }
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    /// Whether a record exists, without creating one
    pub async fn has_sync(&self, sync_id: &str) -> Result<bool, StoreError> {
        match &self.store {
            Some(store) => store.sync_state(sync_id, self.instance.as_ref(), false, false).await,
            None => Ok(false),
        }
    }

    /// Record the checkpoint; true if this call created it
    ///
    /// With `apply`, an existing record is applied to the instance.
    pub async fn create_sync(&self, sync_id: &str, apply: bool) -> Result<bool, StoreError> {
        match &self.store {
            Some(store) => Ok(!store
                .sync_state(sync_id, self.instance.as_ref(), true, apply)
                .await?),
            None => Ok(true),
        }
    }

    /// Record the checkpoint or restore from it; true if it was restored
    pub async fn sync_state(&self, sync_id: &str) -> Result<bool, StoreError> {
        match &self.store {
            Some(store) => store.sync_state(sync_id, self.instance.as_ref(), true, true).await,
            None => Ok(false),
        }
    }
}
