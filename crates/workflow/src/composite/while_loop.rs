use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use super::Sequential;
use crate::argument::Arguments;
use crate::error::Result;
use crate::instance::WorkflowInstance;
use crate::state::Condition;
use crate::workflow::{DynWorkflow, LoadBehavior, Workflow};

/// Enters `body` repeatedly while the condition holds
///
/// The condition is re-checked after every iteration; cancellation ends the
/// loop.
#[derive(Clone)]
pub struct While {
    condition: Condition,
    body: DynWorkflow,
}

impl While {
    pub fn new<W, F>(condition: F, body: W) -> Self
    where
        W: Workflow,
        F: Fn(&Arguments) -> bool + Send + Sync + 'static,
    {
        Self {
            condition: Arc::new(condition),
            body: DynWorkflow::new(body),
        }
    }

    /// Loop over an activity, each iteration in its own child instance
    pub fn activity<F, A, Fut>(condition: F, activity: A) -> Self
    where
        F: Fn(&Arguments) -> bool + Send + Sync + 'static,
        A: Fn(Arc<WorkflowInstance<()>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::new(condition, Sequential::new(activity))
    }
}

#[async_trait]
impl Workflow for While {
    type State = ();

    fn load_behavior(&self) -> LoadBehavior {
        LoadBehavior::Bypass
    }

    async fn execute(&self, instance: &WorkflowInstance<()>) -> Result<()> {
        while !instance.is_cancelled() && (self.condition)(&instance.arguments()) {
            instance.enter_dyn(&self.body, Vec::new()).await?;
        }
        Ok(())
    }
}

impl fmt::Debug for While {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("While").field("body", &self.body).finish()
    }
}
