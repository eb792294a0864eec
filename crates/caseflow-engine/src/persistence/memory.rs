//! In-memory implementation of EngineStore
//!
//! The reference implementation for tests and embedded use. It provides
//! the same semantics a document-store-backed implementation would:
//! atomic family commits, revision conflicts, committed-only indexes.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use super::snapshot::FamilySnapshot;
use super::store::{EngineStore, StoreError};
use crate::audit::{AuditSpan, TraceSummary};

/// In-memory engine store
///
/// # Example
///
/// ```
/// use caseflow_engine::persistence::InMemoryEngineStore;
///
/// let store = InMemoryEngineStore::new();
/// assert_eq!(store.family_count(), 0);
/// ```
pub struct InMemoryEngineStore {
    families: RwLock<HashMap<Uuid, FamilySnapshot>>,
    spans: RwLock<HashMap<Uuid, Vec<AuditSpan>>>,
    workflow_index: RwLock<HashMap<Uuid, Uuid>>,
    work_item_index: RwLock<HashMap<Uuid, Uuid>>,
}

impl InMemoryEngineStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            families: RwLock::new(HashMap::new()),
            spans: RwLock::new(HashMap::new()),
            workflow_index: RwLock::new(HashMap::new()),
            work_item_index: RwLock::new(HashMap::new()),
        }
    }

    /// Number of committed families
    pub fn family_count(&self) -> usize {
        self.families.read().len()
    }

    /// Number of spans recorded for a trace
    pub fn span_count(&self, trace_id: Uuid) -> usize {
        self.spans.read().get(&trace_id).map_or(0, Vec::len)
    }

    /// Clear all data (for testing)
    pub fn clear(&self) {
        self.families.write().clear();
        self.spans.write().clear();
        self.workflow_index.write().clear();
        self.work_item_index.write().clear();
    }
}

impl Default for InMemoryEngineStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EngineStore for InMemoryEngineStore {
    async fn load_family(&self, root_id: Uuid) -> Result<FamilySnapshot, StoreError> {
        self.families
            .read()
            .get(&root_id)
            .cloned()
            .ok_or(StoreError::FamilyNotFound(root_id))
    }

    async fn commit_family(
        &self,
        mut snapshot: FamilySnapshot,
        expected_revision: u64,
        spans: Vec<AuditSpan>,
    ) -> Result<u64, StoreError> {
        let root_id = snapshot.root_id;
        let mut families = self.families.write();

        let actual = families.get(&root_id).map_or(0, |f| f.revision);
        if actual != expected_revision {
            return Err(StoreError::RevisionConflict {
                root_id,
                expected: expected_revision,
                actual,
            });
        }

        snapshot.revision = actual + 1;
        let new_revision = snapshot.revision;

        {
            let mut workflow_index = self.workflow_index.write();
            for id in snapshot.workflows.keys() {
                workflow_index.insert(*id, root_id);
            }
            let mut work_item_index = self.work_item_index.write();
            for id in snapshot.work_items.keys() {
                work_item_index.insert(*id, root_id);
            }
        }

        families.insert(root_id, snapshot);
        drop(families);

        if !spans.is_empty() {
            self.spans.write().entry(root_id).or_default().extend(spans);
        }

        Ok(new_revision)
    }

    async fn root_of_workflow(&self, workflow_id: Uuid) -> Result<Uuid, StoreError> {
        self.workflow_index
            .read()
            .get(&workflow_id)
            .copied()
            .ok_or(StoreError::WorkflowNotFound(workflow_id))
    }

    async fn root_of_work_item(&self, work_item_id: Uuid) -> Result<Uuid, StoreError> {
        self.work_item_index
            .read()
            .get(&work_item_id)
            .copied()
            .ok_or(StoreError::WorkItemNotFound(work_item_id))
    }

    async fn trace_spans(&self, trace_id: Uuid) -> Result<Vec<AuditSpan>, StoreError> {
        Ok(self.spans.read().get(&trace_id).cloned().unwrap_or_default())
    }

    async fn root_spans(&self, trace_id: Uuid) -> Result<Vec<AuditSpan>, StoreError> {
        Ok(self
            .spans
            .read()
            .get(&trace_id)
            .map(|spans| {
                spans
                    .iter()
                    .filter(|s| s.parent_id.is_none())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn child_spans(
        &self,
        trace_id: Uuid,
        parent_span_id: Uuid,
    ) -> Result<Vec<AuditSpan>, StoreError> {
        Ok(self
            .spans
            .read()
            .get(&trace_id)
            .map(|spans| {
                spans
                    .iter()
                    .filter(|s| s.parent_id == Some(parent_span_id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn recent_traces(&self, limit: usize) -> Result<Vec<TraceSummary>, StoreError> {
        let spans = self.spans.read();
        let mut summaries: Vec<TraceSummary> = spans
            .iter()
            .filter(|(_, spans)| !spans.is_empty())
            .map(|(trace_id, spans)| TraceSummary {
                trace_id: *trace_id,
                root_operation: spans
                    .iter()
                    .find(|s| s.parent_id.is_none())
                    .map(|s| s.operation.clone())
                    .unwrap_or_default(),
                span_count: spans.len(),
                started_at: spans[0].started_at,
                last_activity_at: spans[spans.len() - 1].ended_at,
            })
            .collect();

        summaries.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        summaries.truncate(limit);
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::SpanAttributes;
    use crate::model::{WorkflowRecord, WorkflowState};
    use chrono::Utc;

    fn family_with_root() -> (FamilySnapshot, Uuid) {
        let root_id = Uuid::now_v7();
        let mut snap = FamilySnapshot::new(root_id);
        snap.workflows.insert(
            root_id,
            WorkflowRecord::new_root(root_id, "test", "v1", Utc::now()),
        );
        (snap, root_id)
    }

    fn span(trace_id: Uuid, parent: Option<Uuid>, operation: &str) -> AuditSpan {
        AuditSpan {
            id: Uuid::now_v7(),
            parent_id: parent,
            trace_id,
            workflow_id: Some(trace_id),
            resource_id: trace_id.to_string(),
            resource_name: "test".to_string(),
            operation: operation.to_string(),
            depth: u32::from(parent.is_some()),
            started_at: Utc::now(),
            ended_at: Utc::now(),
            attributes: SpanAttributes::Workflow {
                state: WorkflowState::Initialized,
                definition: "test".to_string(),
                parent_workflow_id: None,
                parent_task: None,
            },
        }
    }

    #[tokio::test]
    async fn test_commit_and_load() {
        let store = InMemoryEngineStore::new();
        let (snap, root_id) = family_with_root();

        let revision = store.commit_family(snap, 0, vec![]).await.unwrap();
        assert_eq!(revision, 1);

        let loaded = store.load_family(root_id).await.unwrap();
        assert_eq!(loaded.revision, 1);
        assert_eq!(loaded.workflows.len(), 1);
        assert_eq!(store.root_of_workflow(root_id).await.unwrap(), root_id);
    }

    #[tokio::test]
    async fn test_revision_conflict() {
        let store = InMemoryEngineStore::new();
        let (snap, _root_id) = family_with_root();

        store.commit_family(snap.clone(), 0, vec![]).await.unwrap();

        // Committing again with a stale expected revision must conflict.
        let result = store.commit_family(snap, 0, vec![]).await;
        assert!(matches!(
            result,
            Err(StoreError::RevisionConflict {
                expected: 0,
                actual: 1,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_missing_family() {
        let store = InMemoryEngineStore::new();
        let result = store.load_family(Uuid::now_v7()).await;
        assert!(matches!(result, Err(StoreError::FamilyNotFound(_))));
    }

    #[tokio::test]
    async fn test_span_queries() {
        let store = InMemoryEngineStore::new();
        let (snap, root_id) = family_with_root();

        let root_span = span(root_id, None, "workflow.initializeRoot");
        let child = span(root_id, Some(root_span.id), "condition.incrementMarking");
        store
            .commit_family(snap, 0, vec![root_span.clone(), child])
            .await
            .unwrap();

        assert_eq!(store.span_count(root_id), 2);
        assert_eq!(store.trace_spans(root_id).await.unwrap().len(), 2);

        let roots = store.root_spans(root_id).await.unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].operation, "workflow.initializeRoot");

        let children = store.child_spans(root_id, root_span.id).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].operation, "condition.incrementMarking");
    }

    #[tokio::test]
    async fn test_recent_traces() {
        let store = InMemoryEngineStore::new();

        for _ in 0..3 {
            let (snap, root_id) = family_with_root();
            let s = span(root_id, None, "workflow.initializeRoot");
            store.commit_family(snap, 0, vec![s]).await.unwrap();
        }

        let traces = store.recent_traces(2).await.unwrap();
        assert_eq!(traces.len(), 2);
        assert!(traces[0].last_activity_at >= traces[1].last_activity_at);
        assert_eq!(traces[0].root_operation, "workflow.initializeRoot");
        assert_eq!(traces[0].span_count, 1);
    }
}
