use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::argument::Arguments;
use crate::error::Result;
use crate::instance::WorkflowInstance;
use crate::state::Condition;
use crate::workflow::{DynWorkflow, LoadBehavior, Workflow};

#[derive(Clone)]
struct Branch {
    workflow: DynWorkflow,
    condition: Option<Condition>,
}

/// Conditional branching over child workflows
///
/// Conditioned branches are checked in order and each match is entered; by
/// default only the first. When none matched, every branch registered without
/// a condition runs, in order.
#[derive(Clone)]
pub struct IfElse {
    branches: Vec<Branch>,
    break_after_first_true: bool,
}

impl Default for IfElse {
    fn default() -> Self {
        Self::new(true)
    }
}

impl IfElse {
    pub fn new(break_after_first_true: bool) -> Self {
        Self {
            branches: Vec::new(),
            break_after_first_true,
        }
    }

    /// Add a branch entered when `condition` holds
    pub fn branch<W, F>(mut self, workflow: W, condition: F) -> Self
    where
        W: Workflow,
        F: Fn(&Arguments) -> bool + Send + Sync + 'static,
    {
        self.branches.push(Branch {
            workflow: DynWorkflow::new(workflow),
            condition: Some(Arc::new(condition)),
        });
        self
    }

    /// Add a branch entered when no conditioned branch matched
    pub fn otherwise<W: Workflow>(mut self, workflow: W) -> Self {
        self.branches.push(Branch {
            workflow: DynWorkflow::new(workflow),
            condition: None,
        });
        self
    }

    /// Insert a branch at `index`; `None` as condition makes an else branch
    pub fn insert_branch(&mut self, index: usize, workflow: DynWorkflow, condition: Option<Condition>) {
        let index = index.min(self.branches.len());
        self.branches.insert(index, Branch { workflow, condition });
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }
}

#[async_trait]
impl Workflow for IfElse {
    type State = ();

    fn load_behavior(&self) -> LoadBehavior {
        LoadBehavior::Bypass
    }

    async fn execute(&self, instance: &WorkflowInstance<()>) -> Result<()> {
        let mut matched = false;
        for branch in &self.branches {
            let Some(condition) = &branch.condition else {
                continue;
            };
            if !condition(&instance.arguments()) {
                continue;
            }
            matched = true;
            instance.enter_dyn(&branch.workflow, Vec::new()).await?;
            if self.break_after_first_true {
                break;
            }
        }
        if matched {
            return Ok(());
        }

        for branch in self.branches.iter().filter(|b| b.condition.is_none()) {
            instance.enter_dyn(&branch.workflow, Vec::new()).await?;
        }
        Ok(())
    }
}

impl fmt::Debug for IfElse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IfElse")
            .field("branches", &self.branches.len())
            .field("break_after_first_true", &self.break_after_first_true)
            .finish()
    }
}
