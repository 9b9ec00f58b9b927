//! Workflow registry for creating workflows by type name
//!
//! The registry maps workflow type names to factories that build a
//! [`DynWorkflow`] from JSON parameters. The engine uses it to recreate
//! instances when reloading from a store, and callers use it to create
//! workflows without naming the concrete type.

use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::workflow::{DynWorkflow, Workflow};

/// Factory function type for creating workflows from JSON parameters
pub type WorkflowFactory =
    Box<dyn Fn(Value) -> Result<DynWorkflow, serde_json::Error> + Send + Sync>;

/// Registry of workflow factories
pub struct WorkflowRegistry {
    factories: HashMap<String, WorkflowFactory>,
}

impl Default for WorkflowRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a factory under `workflow_type`
    ///
    /// # Example
    ///
    /// ```ignore
    /// registry.register("Approval", |_params| Ok(ApprovalWorkflow::default()));
    /// ```
    pub fn register<W, F>(&mut self, workflow_type: impl Into<String>, factory: F)
    where
        W: Workflow,
        F: Fn(Value) -> Result<W, serde_json::Error> + Send + Sync + 'static,
    {
        let factory: WorkflowFactory =
            Box::new(move |params: Value| factory(params).map(DynWorkflow::new));
        self.factories.insert(workflow_type.into(), factory);
    }

    /// Register a workflow built by deserializing its parameters
    ///
    /// The type name is taken from a default-constructed value, so it matches
    /// what instances of `W` report.
    pub fn register_default<W>(&mut self)
    where
        W: Workflow + Default + DeserializeOwned,
    {
        let workflow_type = W::default().workflow_type().to_string();
        self.register(workflow_type, |params: Value| {
            if params.is_null() {
                Ok(W::default())
            } else {
                serde_json::from_value::<W>(params)
            }
        });
    }

    /// Check if a workflow type is registered
    pub fn contains(&self, workflow_type: &str) -> bool {
        self.factories.contains_key(workflow_type)
    }

    /// Create a workflow from type name and JSON parameters
    pub fn create(&self, workflow_type: &str, params: Value) -> Result<DynWorkflow, RegistryError> {
        let factory = self
            .factories
            .get(workflow_type)
            .ok_or_else(|| RegistryError::UnknownWorkflowType(workflow_type.to_string()))?;

        factory(params).map_err(RegistryError::Deserialization)
    }

    /// Get the number of registered workflow types
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Get all registered workflow type names
    pub fn workflow_types(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(|s| s.as_str())
    }
}

impl fmt::Debug for WorkflowRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowRegistry")
            .field("workflow_types", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Errors from registry operations
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Workflow type not registered
    #[error("unknown workflow type: {0}")]
    UnknownWorkflowType(String),

    /// Failed to deserialize workflow parameters
    #[error("failed to deserialize workflow parameters: {0}")]
    Deserialization(#[source] serde_json::Error),
}
