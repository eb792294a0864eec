//! Activity hook traits
//!
//! Hooks run synchronously inside the command transaction, in the engine's
//! canonical dispatch order. They observe state through the
//! [`ActivityContext`](super::ActivityContext) and enqueue further work
//! (work-item or child initialization, deferred jobs, flag writes) as
//! requests the engine applies after the hook returns.
//!
//! All methods default to no-ops; implement only what a definition needs.

use serde::{Deserialize, Serialize};

use super::ActivityContext;
use crate::model::{WorkItemRecord, WorkflowRecord};

/// Error returned by an activity hook
///
/// A hook error aborts the whole command transaction and surfaces to the
/// caller as an activity failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityError {
    /// Error message
    pub message: String,

    /// Additional details (for debugging)
    pub details: Option<serde_json::Value>,
}

impl ActivityError {
    /// Create a new activity error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }

    /// Add error details
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl std::fmt::Display for ActivityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ActivityError {}

impl From<anyhow::Error> for ActivityError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Hooks observing a workflow instance
pub trait WorkflowActivities: Send + Sync {
    /// Workflow records created, start condition marked
    fn on_initialized(&self, ctx: &mut ActivityContext) -> Result<(), ActivityError> {
        let _ = ctx;
        Ok(())
    }

    /// Workflow transitioned to started
    fn on_started(&self, ctx: &mut ActivityContext) -> Result<(), ActivityError> {
        let _ = ctx;
        Ok(())
    }

    /// Workflow completed
    fn on_completed(&self, ctx: &mut ActivityContext) -> Result<(), ActivityError> {
        let _ = ctx;
        Ok(())
    }

    /// Workflow failed
    fn on_failed(&self, ctx: &mut ActivityContext) -> Result<(), ActivityError> {
        let _ = ctx;
        Ok(())
    }

    /// Workflow canceled
    fn on_canceled(&self, ctx: &mut ActivityContext) -> Result<(), ActivityError> {
        let _ = ctx;
        Ok(())
    }
}

/// Hooks observing a task
pub trait TaskActivities: Send + Sync {
    /// Join satisfied; the task entered a new generation
    ///
    /// This is where work items are typically initialized
    /// (`ctx.initialize_work_item`) and where dynamic composite tasks
    /// initialize children (`ctx.initialize_child`).
    fn on_enabled(&self, ctx: &mut ActivityContext) -> Result<(), ActivityError> {
        let _ = ctx;
        Ok(())
    }

    /// Join withdrawn before firing; the generation's pending work items
    /// were canceled
    fn on_disabled(&self, ctx: &mut ActivityContext) -> Result<(), ActivityError> {
        let _ = ctx;
        Ok(())
    }

    /// Task fired: input tokens consumed
    fn on_started(&self, ctx: &mut ActivityContext) -> Result<(), ActivityError> {
        let _ = ctx;
        Ok(())
    }

    /// Task completed: output tokens produced
    fn on_completed(&self, ctx: &mut ActivityContext) -> Result<(), ActivityError> {
        let _ = ctx;
        Ok(())
    }

    /// Task failed
    fn on_failed(&self, ctx: &mut ActivityContext) -> Result<(), ActivityError> {
        let _ = ctx;
        Ok(())
    }

    /// Task canceled
    fn on_canceled(&self, ctx: &mut ActivityContext) -> Result<(), ActivityError> {
        let _ = ctx;
        Ok(())
    }

    /// One of the task's work items changed state
    ///
    /// Fires immediately after the work item's own activity for the same
    /// transition, before any task-level transition it triggers.
    fn on_work_item_state_changed(
        &self,
        ctx: &mut ActivityContext,
        work_item: &WorkItemRecord,
    ) -> Result<(), ActivityError> {
        let _ = (ctx, work_item);
        Ok(())
    }

    /// A child workflow of this (composite) task changed state
    fn on_workflow_state_changed(
        &self,
        ctx: &mut ActivityContext,
        child: &WorkflowRecord,
    ) -> Result<(), ActivityError> {
        let _ = (ctx, child);
        Ok(())
    }
}

/// Hooks observing a single work item
pub trait WorkItemActivities: Send + Sync {
    /// Work item created
    fn on_initialized(
        &self,
        ctx: &mut ActivityContext,
        work_item: &WorkItemRecord,
    ) -> Result<(), ActivityError> {
        let _ = (ctx, work_item);
        Ok(())
    }

    /// Work item started
    fn on_started(
        &self,
        ctx: &mut ActivityContext,
        work_item: &WorkItemRecord,
    ) -> Result<(), ActivityError> {
        let _ = (ctx, work_item);
        Ok(())
    }

    /// Work item completed
    fn on_completed(
        &self,
        ctx: &mut ActivityContext,
        work_item: &WorkItemRecord,
    ) -> Result<(), ActivityError> {
        let _ = (ctx, work_item);
        Ok(())
    }

    /// Work item failed
    fn on_failed(
        &self,
        ctx: &mut ActivityContext,
        work_item: &WorkItemRecord,
    ) -> Result<(), ActivityError> {
        let _ = (ctx, work_item);
        Ok(())
    }

    /// Work item canceled
    fn on_canceled(
        &self,
        ctx: &mut ActivityContext,
        work_item: &WorkItemRecord,
    ) -> Result<(), ActivityError> {
        let _ = (ctx, work_item);
        Ok(())
    }
}

/// Workflow hooks that do nothing
pub struct NoopWorkflowActivities;

impl WorkflowActivities for NoopWorkflowActivities {}

/// Task hooks that do nothing
pub struct NoopTaskActivities;

impl TaskActivities for NoopTaskActivities {}

/// Work-item hooks that do nothing
pub struct NoopWorkItemActivities;

impl WorkItemActivities for NoopWorkItemActivities {}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_defaults_are_noops() {
        struct Bare;
        impl TaskActivities for Bare {}

        let mut ctx = ActivityContext::for_workflow(Uuid::now_v7(), Uuid::now_v7());
        assert!(Bare.on_enabled(&mut ctx).is_ok());
        assert!(Bare.on_canceled(&mut ctx).is_ok());
    }

    #[test]
    fn test_activity_error_display() {
        let err = ActivityError::new("quota exceeded")
            .with_details(serde_json::json!({ "limit": 10 }));
        assert_eq!(err.to_string(), "quota exceeded");
        assert!(err.details.is_some());
    }
}
