//! The workflow engine: instance registry, type registry and lifecycle fan-out

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::descriptor::LifecycleEvent;
use super::registry::WorkflowRegistry;
use crate::config::EngineConfig;
use crate::error::{Result, WorkflowError};
use crate::instance::{AnyInstance, WorkflowInstance};
use crate::persistence::{StoreEvent, StoredEvent, WorkflowStore};
use crate::workflow::{DynWorkflow, StateKey, Workflow};

/// State shared by the engine handle and its instances
///
/// Instances hold only a `Weak` reference, so dropping every engine handle
/// tears the registry down.
pub(crate) struct EngineShared {
    config: EngineConfig,
    instances: DashMap<Uuid, Arc<dyn AnyInstance>>,
    registry: RwLock<WorkflowRegistry>,
    store: Option<Arc<dyn WorkflowStore>>,
    events: broadcast::Sender<LifecycleEvent>,
    disposed: AtomicBool,
}

impl EngineShared {
    /// Record a lifecycle event with the store, if one is attached
    pub(crate) async fn persist(&self, event: StoreEvent, instance: &dyn AnyInstance) {
        let Some(store) = &self.store else {
            return;
        };
        let record = StoredEvent::capture(event, instance);
        if let Err(e) = store.store_event(&record).await {
            warn!(
                workflow_id = %record.workflow_id,
                event = %event,
                error = %e,
                "failed to record workflow event"
            );
        }
    }

    /// Record the Create event in the background when a store is attached
    ///
    /// Outside a tokio runtime the event is left to the instance's start.
    fn record_created(self: &Arc<Self>, instance: Arc<dyn AnyInstance>) {
        if self.store.is_none() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let shared = self.clone();
        runtime.spawn(async move {
            shared.persist(StoreEvent::Create, instance.as_ref()).await;
        });
    }

    /// Broadcast a lifecycle event and apply the removal policy
    pub(crate) fn notify(
        &self,
        event: StoreEvent,
        workflow_id: Uuid,
        parent_id: Option<Uuid>,
        workflow_type: &str,
        error: Option<String>,
    ) {
        let lifecycle = LifecycleEvent {
            workflow_id,
            parent_id,
            workflow_type: workflow_type.to_string(),
            event,
            error,
        };
        let terminal = lifecycle.is_terminal();
        // No subscribers is fine
        let _ = self.events.send(lifecycle);

        if terminal && self.config.remove_completed_immediately {
            self.instances.remove(&workflow_id);
            debug!(%workflow_id, "removed completed workflow");
        }
    }
}

/// Creates, tracks and disposes workflow instances
///
/// Cloning the engine clones a handle to the same registry.
///
/// # Example
///
/// ```ignore
/// use everruns_workflow::prelude::*;
///
/// let engine = WorkflowEngine::new();
/// let instance = engine.create_workflow(ApprovalWorkflow::default());
/// instance.start(Vec::new()).await?;
/// instance.action("Assign").await?;
/// ```
#[derive(Clone)]
pub struct WorkflowEngine {
    shared: Arc<EngineShared>,
}

impl Default for WorkflowEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowEngine {
    /// Create an engine with default configuration and no store
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::build(config, None)
    }

    /// Create an engine that records lifecycle events through `store`
    pub fn with_store(config: EngineConfig, store: Arc<dyn WorkflowStore>) -> Self {
        Self::build(config, Some(store))
    }

    fn build(config: EngineConfig, store: Option<Arc<dyn WorkflowStore>>) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            shared: Arc::new(EngineShared {
                config,
                instances: DashMap::new(),
                registry: RwLock::new(WorkflowRegistry::new()),
                store,
                events,
                disposed: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn from_shared(shared: Arc<EngineShared>) -> Self {
        Self { shared }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    pub fn store(&self) -> Option<Arc<dyn WorkflowStore>> {
        self.shared.store.clone()
    }

    // ========================================================================
    // Type registry
    // ========================================================================

    /// Register a factory for creating workflows by type name
    pub fn register<W, F>(&self, workflow_type: impl Into<String>, factory: F)
    where
        W: Workflow,
        F: Fn(Value) -> std::result::Result<W, serde_json::Error> + Send + Sync + 'static,
    {
        self.shared.registry.write().register(workflow_type, factory);
    }

    /// Register a workflow that deserializes from its parameters
    pub fn register_default<W>(&self)
    where
        W: Workflow + Default + serde::de::DeserializeOwned,
    {
        self.shared.registry.write().register_default::<W>();
    }

    pub fn registered_types(&self) -> Vec<String> {
        self.shared
            .registry
            .read()
            .workflow_types()
            .map(str::to_string)
            .collect()
    }

    /// Build a workflow definition from a registered type name
    pub fn workflow_from_type(&self, workflow_type: &str, params: Value) -> Result<DynWorkflow> {
        Ok(self.shared.registry.read().create(workflow_type, params)?)
    }

    /// Subscribe to start, completion and error events of every instance
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.shared.events.subscribe()
    }

    // ========================================================================
    // Instance creation
    // ========================================================================

    /// Create an instance with a fresh id; it runs once started
    pub fn create_workflow<W: Workflow>(&self, workflow: W) -> Arc<WorkflowInstance<W::State>> {
        self.insert_new(Arc::new(workflow), Uuid::now_v7(), None)
    }

    /// Create an instance under `id`, or return the one already there
    ///
    /// Fails with `InstanceTypeMismatch` when the existing instance has a
    /// different state type.
    pub fn create_workflow_with_id<W: Workflow>(
        &self,
        workflow: W,
        id: Uuid,
        parent_id: Option<Uuid>,
    ) -> Result<Arc<WorkflowInstance<W::State>>> {
        self.instantiate(Arc::new(workflow), id, parent_id)
            .into_any()
            .downcast::<WorkflowInstance<W::State>>()
            .map_err(|_| WorkflowError::InstanceTypeMismatch(id))
    }

    pub fn create_dyn(&self, workflow: &DynWorkflow) -> Arc<dyn AnyInstance> {
        workflow.instantiate(self, Uuid::now_v7(), None)
    }

    /// Type-erased [`create_workflow_with_id`](Self::create_workflow_with_id)
    pub fn create_dyn_with_id(
        &self,
        workflow: &DynWorkflow,
        id: Uuid,
        parent_id: Option<Uuid>,
    ) -> Arc<dyn AnyInstance> {
        workflow.instantiate(self, id, parent_id)
    }

    /// Create an instance of a registered type from JSON parameters
    #[instrument(skip(self, params))]
    pub fn create_by_type(&self, workflow_type: &str, params: Value) -> Result<Arc<dyn AnyInstance>> {
        let workflow = self.workflow_from_type(workflow_type, params)?;
        Ok(self.create_dyn(&workflow))
    }

    /// Idempotent insertion used by typed and type-erased creation
    pub(crate) fn instantiate<W: Workflow>(
        &self,
        workflow: Arc<W>,
        id: Uuid,
        parent_id: Option<Uuid>,
    ) -> Arc<dyn AnyInstance> {
        let entry = self.shared.instances.entry(id).or_insert_with(|| {
            let instance: Arc<dyn AnyInstance> = self.new_instance(workflow, id, parent_id);
            instance
        });
        entry.value().clone()
    }

    pub(crate) fn create_child<W: Workflow>(
        &self,
        workflow: W,
        parent_id: Uuid,
    ) -> Arc<WorkflowInstance<W::State>> {
        self.insert_new(Arc::new(workflow), Uuid::now_v7(), Some(parent_id))
    }

    fn insert_new<W: Workflow>(
        &self,
        workflow: Arc<W>,
        id: Uuid,
        parent_id: Option<Uuid>,
    ) -> Arc<WorkflowInstance<W::State>> {
        let instance = self.new_instance(workflow, id, parent_id);
        self.shared.instances.insert(id, instance.clone());
        instance
    }

    fn new_instance<W: Workflow>(
        &self,
        workflow: Arc<W>,
        id: Uuid,
        parent_id: Option<Uuid>,
    ) -> Arc<WorkflowInstance<W::State>> {
        let workflow: Arc<dyn Workflow<State = W::State>> = workflow;
        debug!(
            workflow_id = %id,
            workflow_type = %workflow.workflow_type(),
            parent_id = ?parent_id,
            "created workflow instance"
        );
        let instance = WorkflowInstance::new(Arc::downgrade(&self.shared), workflow, id, parent_id);
        self.shared.record_created(instance.clone());
        instance
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    pub fn get_workflow(&self, id: Uuid) -> Option<Arc<dyn AnyInstance>> {
        self.shared.instances.get(&id).map(|entry| entry.value().clone())
    }

    /// Look up an instance with a known state type
    pub fn get_typed<S: StateKey>(&self, id: Uuid) -> Option<Arc<WorkflowInstance<S>>> {
        self.get_workflow(id)?
            .into_any()
            .downcast::<WorkflowInstance<S>>()
            .ok()
    }

    pub fn find_workflows<F>(&self, predicate: F) -> Vec<Arc<dyn AnyInstance>>
    where
        F: Fn(&dyn AnyInstance) -> bool,
    {
        self.shared
            .instances
            .iter()
            .filter(|entry| predicate(entry.value().as_ref()))
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn workflows(&self) -> Vec<Arc<dyn AnyInstance>> {
        self.find_workflows(|_| true)
    }

    /// Forget an instance; it keeps running if it was started
    pub fn remove_workflow(&self, id: Uuid) -> Option<Arc<dyn AnyInstance>> {
        self.shared.instances.remove(&id).map(|(_, instance)| instance)
    }

    pub fn len(&self) -> usize {
        self.shared.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.instances.is_empty()
    }

    // ========================================================================
    // Store & teardown
    // ========================================================================

    /// Recreate and restart every unfinished instance recorded in the store
    ///
    /// Returns the ids of restarted instances; an engine without a store
    /// restores nothing.
    #[instrument(skip(self))]
    pub async fn load_from_store(&self) -> Result<Vec<Uuid>> {
        let Some(store) = self.store() else {
            return Ok(Vec::new());
        };
        let restored = store.load_from_store(self).await?;
        info!(count = restored.len(), "restored workflows from store");
        Ok(restored)
    }

    /// Cancel every registered instance and release the registry
    pub fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let instances: Vec<_> = self.workflows();
        info!(count = instances.len(), "disposing workflow engine");
        for instance in instances {
            instance.dispose();
        }
        self.shared.instances.clear();
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("config", &self.shared.config)
            .field("instances", &self.shared.instances.len())
            .field("registry", &*self.shared.registry.read())
            .field("has_store", &self.shared.store.is_some())
            .finish()
    }
}
