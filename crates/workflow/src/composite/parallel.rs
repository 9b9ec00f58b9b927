use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::debug;

use crate::argument::Argument;
use crate::error::Result;
use crate::instance::WorkflowInstance;
use crate::workflow::{DynWorkflow, LoadBehavior, Workflow};

/// Starts every child at once and waits for all of them
///
/// A failing child does not cancel its siblings.
#[derive(Debug, Clone, Default)]
pub struct Parallel {
    children: Vec<(DynWorkflow, Vec<Arc<Argument>>)>,
}

impl Parallel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a child with extra arguments for it alone
    pub fn add<W: Workflow>(
        &mut self,
        workflow: W,
        arguments: impl IntoIterator<Item = Arc<Argument>>,
    ) -> &mut Self {
        self.add_dyn(DynWorkflow::new(workflow), arguments)
    }

    pub fn add_dyn(
        &mut self,
        workflow: DynWorkflow,
        arguments: impl IntoIterator<Item = Arc<Argument>>,
    ) -> &mut Self {
        self.children.push((workflow, arguments.into_iter().collect()));
        self
    }

    pub fn with<W: Workflow>(mut self, workflow: W) -> Self {
        self.add(workflow, Vec::new());
        self
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

#[async_trait]
impl Workflow for Parallel {
    type State = ();

    fn load_behavior(&self) -> LoadBehavior {
        LoadBehavior::Bypass
    }

    async fn execute(&self, instance: &WorkflowInstance<()>) -> Result<()> {
        let mut children = Vec::with_capacity(self.children.len());
        for (workflow, arguments) in &self.children {
            children.push(instance.spawn_dyn(workflow, arguments.iter().cloned())?);
        }
        debug!(workflow_id = %instance.id(), count = children.len(), "parallel children started");

        for result in join_all(children.iter().map(|child| child.wait())).await {
            result?;
        }
        Ok(())
    }
}
