//! Causal audit trail: spans per mutation, trace reconstruction on read

mod reader;
mod span;

pub use reader::{TaskStateView, TraceReader, WorkflowStateView};
pub use span::{AuditSpan, ConditionOp, ResourceKind, SpanAttributes, TraceSummary};
