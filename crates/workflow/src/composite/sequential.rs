use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::Result;
use crate::instance::WorkflowInstance;
use crate::workflow::{LoadBehavior, Workflow};

/// Async body of a [`Sequential`] workflow
pub type Activity =
    Arc<dyn Fn(Arc<WorkflowInstance<()>>) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Runs one activity function against its instance
///
/// ```ignore
/// let step = Sequential::new(|instance| async move {
///     instance.argument_value::<i64>("Counter")?;
///     Ok(())
/// });
/// ```
#[derive(Clone, Default)]
pub struct Sequential {
    activity: Option<Activity>,
}

impl Sequential {
    pub fn new<F, Fut>(activity: F) -> Self
    where
        F: Fn(Arc<WorkflowInstance<()>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            activity: Some(Arc::new(move |instance| activity(instance).boxed())),
        }
    }
}

#[async_trait]
impl Workflow for Sequential {
    type State = ();

    fn load_behavior(&self) -> LoadBehavior {
        LoadBehavior::Bypass
    }

    async fn execute(&self, instance: &WorkflowInstance<()>) -> Result<()> {
        match &self.activity {
            Some(activity) => activity(instance.handle()?).await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Sequential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequential")
            .field("has_activity", &self.activity.is_some())
            .finish()
    }
}
