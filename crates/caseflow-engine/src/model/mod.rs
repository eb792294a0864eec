//! Data model: records persisted per workflow family and their state machines

mod condition;
mod stats;
mod task;
mod work_item;
mod workflow;

pub use condition::ConditionRecord;
pub use stats::{ShardCounters, TaskStats, WorkItemTotals};
pub use task::{TaskRecord, TaskState};
pub use work_item::{
    Actor, Claim, Offer, OfferScope, PayloadEnvelope, WorkItemRecord, WorkItemState,
};
pub use workflow::{ParentRef, WorkflowRecord, WorkflowState};
