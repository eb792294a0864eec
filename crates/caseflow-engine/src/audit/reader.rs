//! Trace reading and state reconstruction
//!
//! The reader answers audit queries against committed spans only. State
//! reconstruction replays span attributes in commit order up to a
//! timestamp; the result matches the last observed marking/state exactly.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::span::{AuditSpan, SpanAttributes, TraceSummary};
use crate::model::{TaskState, WorkItemState, WorkflowState};
use crate::persistence::{EngineStore, StoreError};

/// Task state as observed at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskStateView {
    /// Observed state
    pub state: TaskState,

    /// Observed generation
    pub generation: u32,
}

/// Root-workflow state reconstructed from spans
#[derive(Debug, Clone, Default)]
pub struct WorkflowStateView {
    /// Root workflow state, if any workflow span was observed
    pub workflow_state: Option<WorkflowState>,

    /// Condition markings by name
    pub conditions: HashMap<String, u32>,

    /// Task states by name
    pub tasks: HashMap<String, TaskStateView>,

    /// Work item states by id
    pub work_items: HashMap<Uuid, WorkItemState>,
}

/// Read API over a trace's audit spans
pub struct TraceReader<S> {
    store: Arc<S>,
}

impl<S: EngineStore> TraceReader<S> {
    /// Create a reader over a store
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Root spans (one per command) of a trace
    pub async fn root_spans(&self, trace_id: Uuid) -> Result<Vec<AuditSpan>, StoreError> {
        self.store.root_spans(trace_id).await
    }

    /// Direct children of a span
    pub async fn child_spans(
        &self,
        trace_id: Uuid,
        parent_span_id: Uuid,
    ) -> Result<Vec<AuditSpan>, StoreError> {
        self.store.child_spans(trace_id, parent_span_id).await
    }

    /// Most recently active traces
    pub async fn recent_traces(&self, limit: usize) -> Result<Vec<TraceSummary>, StoreError> {
        self.store.recent_traces(limit).await
    }

    /// Reconstruct the root workflow's state as of `at`
    ///
    /// Replays every span of the root workflow whose close time is `<= at`,
    /// in commit order. Spans of child workflows are skipped: the view is
    /// scoped to the root, whose id equals the trace id.
    pub async fn workflow_state_at(
        &self,
        trace_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<WorkflowStateView, StoreError> {
        let spans = self.store.trace_spans(trace_id).await?;
        let mut view = WorkflowStateView::default();

        for span in &spans {
            if span.ended_at > at || span.workflow_id != Some(trace_id) {
                continue;
            }

            match &span.attributes {
                SpanAttributes::Workflow { state, .. } => {
                    view.workflow_state = Some(*state);
                }
                SpanAttributes::Task { state, generation } => {
                    view.tasks.insert(
                        span.resource_name.clone(),
                        TaskStateView {
                            state: *state,
                            generation: *generation,
                        },
                    );
                }
                SpanAttributes::Condition { marking_after, .. } => {
                    view.conditions
                        .insert(span.resource_name.clone(), *marking_after);
                }
                SpanAttributes::WorkItem { state, .. } => {
                    if let Ok(id) = span.resource_id.parse::<Uuid>() {
                        view.work_items.insert(id, *state);
                    }
                }
                SpanAttributes::Activity { .. } | SpanAttributes::Custom { .. } => {}
            }
        }

        Ok(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::ConditionOp;
    use crate::persistence::{FamilySnapshot, InMemoryEngineStore};
    use chrono::Duration;

    fn condition_span(
        trace_id: Uuid,
        name: &str,
        after: u32,
        at: DateTime<Utc>,
    ) -> AuditSpan {
        AuditSpan {
            id: Uuid::now_v7(),
            parent_id: None,
            trace_id,
            workflow_id: Some(trace_id),
            resource_id: format!("{trace_id}/{name}"),
            resource_name: name.to_string(),
            operation: "condition.incrementMarking".to_string(),
            depth: 1,
            started_at: at,
            ended_at: at,
            attributes: SpanAttributes::Condition {
                operation: ConditionOp::IncrementMarking,
                marking_before: after.saturating_sub(1),
                marking_after: after,
            },
        }
    }

    #[tokio::test]
    async fn test_state_at_time_replays_last_marking() {
        let store = Arc::new(InMemoryEngineStore::new());
        let trace_id = Uuid::now_v7();
        let t0 = Utc::now();
        let t1 = t0 + Duration::milliseconds(10);

        let snap = FamilySnapshot::new(trace_id);
        store
            .commit_family(
                snap,
                0,
                vec![
                    condition_span(trace_id, "start", 1, t0),
                    condition_span(trace_id, "start", 2, t1),
                ],
            )
            .await
            .unwrap();

        let reader = TraceReader::new(store);

        // Between the two spans: only the first applies.
        let view = reader
            .workflow_state_at(trace_id, t0 + Duration::milliseconds(5))
            .await
            .unwrap();
        assert_eq!(view.conditions.get("start"), Some(&1));

        // At the end: the last write wins.
        let view = reader.workflow_state_at(trace_id, t1).await.unwrap();
        assert_eq!(view.conditions.get("start"), Some(&2));
    }

    #[tokio::test]
    async fn test_child_workflow_spans_excluded_from_root_view() {
        let store = Arc::new(InMemoryEngineStore::new());
        let trace_id = Uuid::now_v7();
        let child_wf = Uuid::now_v7();
        let now = Utc::now();

        let mut child_span = condition_span(trace_id, "start", 7, now);
        child_span.workflow_id = Some(child_wf);

        store
            .commit_family(FamilySnapshot::new(trace_id), 0, vec![child_span])
            .await
            .unwrap();

        let reader = TraceReader::new(store);
        let view = reader.workflow_state_at(trace_id, now).await.unwrap();
        assert!(view.conditions.is_empty());
    }
}
