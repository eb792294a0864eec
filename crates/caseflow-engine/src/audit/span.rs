//! Audit span records
//!
//! Every state mutation inside a command emits a span whose parent is the
//! command's root span (or the enclosing cascade span). The trace id equals
//! the root workflow id, so one trace covers a whole workflow family.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{TaskState, WorkItemState, WorkflowState};

/// Kind of resource a span describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Workflow,
    Task,
    Condition,
    WorkItem,
    Activity,
    Custom,
}

/// Marking operation recorded on a condition span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionOp {
    IncrementMarking,
    DecrementMarking,
}

/// Attributes typed by resource kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resource", rename_all = "snake_case")]
pub enum SpanAttributes {
    /// Workflow state change
    Workflow {
        /// Resulting state
        state: WorkflowState,
        /// Definition name
        definition: String,
        /// Composite parent, for child workflows
        parent_workflow_id: Option<Uuid>,
        /// Composite parent task, for child workflows
        parent_task: Option<String>,
    },

    /// Task state change
    Task {
        /// Resulting state
        state: TaskState,
        /// Generation the change applies to
        generation: u32,
    },

    /// Condition marking change
    Condition {
        /// Increment or decrement
        operation: ConditionOp,
        /// Marking before the change
        marking_before: u32,
        /// Marking after the change
        marking_after: u32,
    },

    /// Work item state change
    WorkItem {
        /// Resulting state
        state: WorkItemState,
        /// Owning task
        task: String,
        /// Owning task generation
        generation: u32,
    },

    /// Activity hook invocation
    Activity {
        /// Hook name, e.g. `task.onEnabled`
        hook: String,
    },

    /// Free-form attributes
    Custom {
        /// Arbitrary payload
        data: serde_json::Value,
    },
}

impl SpanAttributes {
    /// Resource kind implied by the attribute variant
    pub fn resource_kind(&self) -> ResourceKind {
        match self {
            Self::Workflow { .. } => ResourceKind::Workflow,
            Self::Task { .. } => ResourceKind::Task,
            Self::Condition { .. } => ResourceKind::Condition,
            Self::WorkItem { .. } => ResourceKind::WorkItem,
            Self::Activity { .. } => ResourceKind::Activity,
            Self::Custom { .. } => ResourceKind::Custom,
        }
    }
}

/// One audit span
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSpan {
    /// Span id
    pub id: Uuid,

    /// Parent span (None for a command's root span)
    pub parent_id: Option<Uuid>,

    /// Trace id (the root workflow id)
    pub trace_id: Uuid,

    /// Workflow the mutated element belongs to, when applicable
    pub workflow_id: Option<Uuid>,

    /// Resource id, e.g. the work item id or `<workflow>/<condition>`
    pub resource_id: String,

    /// Resource display name, e.g. the condition or task name
    pub resource_name: String,

    /// Operation, e.g. `task.enable`, `condition.incrementMarking`
    pub operation: String,

    /// Nesting depth below the command root span
    pub depth: u32,

    /// Span open time
    pub started_at: DateTime<Utc>,

    /// Span close time
    pub ended_at: DateTime<Utc>,

    /// Resource-typed attributes
    pub attributes: SpanAttributes,
}

impl AuditSpan {
    /// Resource kind of this span
    pub fn resource_kind(&self) -> ResourceKind {
        self.attributes.resource_kind()
    }
}

/// Summary row for `listRecentTraces`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceSummary {
    /// Trace id (root workflow id)
    pub trace_id: Uuid,

    /// Operation of the first root span, e.g. `workflow.initializeRoot`
    pub root_operation: String,

    /// Number of spans recorded so far
    pub span_count: usize,

    /// First span open time
    pub started_at: DateTime<Utc>,

    /// Last span close time
    pub last_activity_at: DateTime<Utc>,
}
