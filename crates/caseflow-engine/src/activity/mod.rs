//! User-defined activity hooks and their dispatch

mod context;
mod dispatcher;
mod hooks;

pub use context::{ActivityContext, ActivityRequest};
pub use hooks::{
    ActivityError, NoopTaskActivities, NoopWorkItemActivities, NoopWorkflowActivities,
    TaskActivities, WorkItemActivities, WorkflowActivities,
};

pub(crate) use dispatcher::run_hook;
