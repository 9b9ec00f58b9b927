//! Type-erased workflow definitions
//!
//! Composites hold children of arbitrary workflow types, and the registry
//! produces workflows from a type name. Both go through [`DynWorkflow`].

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use super::{LoadBehavior, Workflow};
use crate::engine::WorkflowEngine;
use crate::instance::AnyInstance;

trait Instantiate: Send + Sync {
    fn workflow_type(&self) -> &str;

    fn load_behavior(&self) -> LoadBehavior;

    fn instantiate(
        &self,
        engine: &WorkflowEngine,
        id: Uuid,
        parent_id: Option<Uuid>,
    ) -> Arc<dyn AnyInstance>;
}

struct Typed<W: Workflow> {
    inner: Arc<W>,
}

impl<W: Workflow> Instantiate for Typed<W> {
    fn workflow_type(&self) -> &str {
        self.inner.workflow_type()
    }

    fn load_behavior(&self) -> LoadBehavior {
        self.inner.load_behavior()
    }

    fn instantiate(
        &self,
        engine: &WorkflowEngine,
        id: Uuid,
        parent_id: Option<Uuid>,
    ) -> Arc<dyn AnyInstance> {
        engine.instantiate(self.inner.clone(), id, parent_id)
    }
}

/// A shareable workflow definition of any type
///
/// Entering the same `DynWorkflow` twice runs two instances over one shared
/// definition.
#[derive(Clone)]
pub struct DynWorkflow {
    inner: Arc<dyn Instantiate>,
}

impl DynWorkflow {
    pub fn new<W: Workflow>(workflow: W) -> Self {
        Self::from_arc(Arc::new(workflow))
    }

    pub fn from_arc<W: Workflow>(workflow: Arc<W>) -> Self {
        Self {
            inner: Arc::new(Typed { inner: workflow }),
        }
    }

    pub fn workflow_type(&self) -> &str {
        self.inner.workflow_type()
    }

    pub fn load_behavior(&self) -> LoadBehavior {
        self.inner.load_behavior()
    }

    /// Create (or fetch, when `id` is taken) the instance in `engine`
    pub(crate) fn instantiate(
        &self,
        engine: &WorkflowEngine,
        id: Uuid,
        parent_id: Option<Uuid>,
    ) -> Arc<dyn AnyInstance> {
        self.inner.instantiate(engine, id, parent_id)
    }
}

impl fmt::Debug for DynWorkflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynWorkflow")
            .field("workflow_type", &self.workflow_type())
            .finish()
    }
}
