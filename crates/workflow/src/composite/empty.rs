use async_trait::async_trait;

use crate::error::Result;
use crate::instance::WorkflowInstance;
use crate::workflow::{LoadBehavior, Workflow};

/// Workflow whose body does nothing; a placeholder follow-up
#[derive(Debug, Clone, Copy, Default)]
pub struct Empty;

#[async_trait]
impl Workflow for Empty {
    type State = ();

    fn load_behavior(&self) -> LoadBehavior {
        LoadBehavior::Bypass
    }

    async fn execute(&self, _instance: &WorkflowInstance<()>) -> Result<()> {
        Ok(())
    }
}
