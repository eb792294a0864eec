//! Definition registry: the process-wide version manager
//!
//! Definitions register under (name, version) once at startup; this is the
//! only process-wide mutable table. Child definitions are embedded in their
//! parent tasks and resolved by walking a workflow record's parent chain.

use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use crate::definition::WorkflowDefinition;
use crate::error::EngineError;
use crate::persistence::FamilySnapshot;

/// Errors from registry operations
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A definition is already registered under this (name, version)
    #[error("definition {name}@{version} is already registered")]
    Duplicate {
        /// Definition name
        name: String,
        /// Version label
        version: String,
    },
}

/// Registry of root workflow definitions keyed by (name, version)
#[derive(Default)]
pub struct DefinitionRegistry {
    definitions: DashMap<(String, String), Arc<WorkflowDefinition>>,
}

impl DefinitionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a root definition
    pub fn register(&self, definition: WorkflowDefinition) -> Result<(), RegistryError> {
        let key = (
            definition.name().to_string(),
            definition.version().to_string(),
        );
        if self.definitions.contains_key(&key) {
            return Err(RegistryError::Duplicate {
                name: key.0,
                version: key.1,
            });
        }
        self.definitions.insert(key, Arc::new(definition));
        Ok(())
    }

    /// Look up a root definition
    pub fn get(&self, name: &str, version: &str) -> Option<Arc<WorkflowDefinition>> {
        self.definitions
            .get(&(name.to_string(), version.to_string()))
            .map(|entry| entry.value().clone())
    }

    /// Whether a definition is registered
    pub fn contains(&self, name: &str, version: &str) -> bool {
        self.definitions
            .contains_key(&(name.to_string(), version.to_string()))
    }

    /// Number of registered definitions
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl std::fmt::Debug for DefinitionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<String> = self
            .definitions
            .iter()
            .map(|e| format!("{}@{}", e.key().0, e.key().1))
            .collect();
        f.debug_struct("DefinitionRegistry")
            .field("definitions", &keys)
            .finish()
    }
}

/// Resolve the definition governing a workflow record
///
/// Roots resolve through the registry; child workflows resolve through
/// their parent task's embedded child set, walking the parent chain up to
/// the root.
pub(crate) fn resolve_definition(
    registry: &DefinitionRegistry,
    snap: &FamilySnapshot,
    workflow_id: Uuid,
) -> Result<Arc<WorkflowDefinition>, EngineError> {
    let record = snap.workflow(workflow_id).ok_or(EngineError::Store(
        crate::persistence::StoreError::WorkflowNotFound(workflow_id),
    ))?;

    match &record.parent {
        None => registry
            .get(&record.definition_name, &record.version)
            .ok_or_else(|| EngineError::UnknownDefinition {
                name: record.definition_name.clone(),
                version: record.version.clone(),
            }),
        Some(parent) => {
            let parent_def = resolve_definition(registry, snap, parent.workflow_id)?;
            parent_def
                .task(&parent.task_name)
                .and_then(|task| task.kind().child_named(&record.definition_name))
                .cloned()
                .ok_or_else(|| EngineError::UnknownDefinition {
                    name: record.definition_name.clone(),
                    version: record.version.clone(),
                })
        }
    }
}
