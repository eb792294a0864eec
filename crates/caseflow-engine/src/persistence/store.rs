//! EngineStore trait definition

use async_trait::async_trait;
use uuid::Uuid;

use super::snapshot::FamilySnapshot;
use crate::audit::{AuditSpan, TraceSummary};

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No family committed under this root
    #[error("workflow family not found: {0}")]
    FamilyNotFound(Uuid),

    /// Workflow id not present in any family index
    #[error("workflow not found: {0}")]
    WorkflowNotFound(Uuid),

    /// Work item id not present in any family index
    #[error("work item not found: {0}")]
    WorkItemNotFound(Uuid),

    /// Optimistic-concurrency failure; reload and retry
    #[error("revision conflict on family {root_id}: expected {expected}, found {actual}")]
    RevisionConflict {
        /// Contended family root
        root_id: Uuid,
        /// Revision the committer loaded
        expected: u64,
        /// Revision actually stored
        actual: u64,
    },

    /// Backend failure
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Store for workflow families and their audit trail
///
/// Implementations must be thread-safe. A commit is atomic: the snapshot
/// replaces the stored family and the spans append to the trace in one
/// step, or nothing happens at all. Secondary indexes
/// (`workflow id -> root`, `work item id -> root`) must reflect committed
/// state only.
#[async_trait]
pub trait EngineStore: Send + Sync + 'static {
    // =========================================================================
    // Family Operations
    // =========================================================================

    /// Load the current snapshot of a family
    async fn load_family(&self, root_id: Uuid) -> Result<FamilySnapshot, StoreError>;

    /// Commit a family snapshot with optimistic concurrency
    ///
    /// `expected_revision` is the revision the committer loaded (0 creates
    /// the family). Returns the new revision. Fails with
    /// [`StoreError::RevisionConflict`] when another commit interleaved.
    async fn commit_family(
        &self,
        snapshot: FamilySnapshot,
        expected_revision: u64,
        spans: Vec<AuditSpan>,
    ) -> Result<u64, StoreError>;

    // =========================================================================
    // Secondary Indexes
    // =========================================================================

    /// Resolve a workflow id to its family root
    async fn root_of_workflow(&self, workflow_id: Uuid) -> Result<Uuid, StoreError>;

    /// Resolve a work item id to its family root
    async fn root_of_work_item(&self, work_item_id: Uuid) -> Result<Uuid, StoreError>;

    // =========================================================================
    // Audit Trail
    // =========================================================================

    /// All spans of a trace, in commit order
    async fn trace_spans(&self, trace_id: Uuid) -> Result<Vec<AuditSpan>, StoreError>;

    /// Root spans (no parent) of a trace, in commit order
    async fn root_spans(&self, trace_id: Uuid) -> Result<Vec<AuditSpan>, StoreError>;

    /// Direct children of a span, in commit order
    async fn child_spans(
        &self,
        trace_id: Uuid,
        parent_span_id: Uuid,
    ) -> Result<Vec<AuditSpan>, StoreError>;

    /// Most recently active traces, newest first
    async fn recent_traces(&self, limit: usize) -> Result<Vec<TraceSummary>, StoreError>;
}
