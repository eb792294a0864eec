//! Activity execution context
//!
//! Hooks cannot hold the transaction mutably while the engine does, so the
//! context records *requests* which the engine applies, in order, right
//! after the hook returns — still inside the same transaction. Deferred
//! jobs become visible to other commands only after commit.

use std::time::Duration;

use uuid::Uuid;

use crate::engine::Command;
use crate::model::Offer;

/// A request enqueued by an activity hook
#[derive(Debug, Clone)]
pub enum ActivityRequest {
    /// Initialize a work item on the hook's task
    InitializeWorkItem {
        /// Initialization payload
        payload: serde_json::Value,
        /// Optional offer for human work
        offer: Option<Offer>,
    },

    /// Initialize a child workflow (dynamic composite tasks only)
    InitializeChild {
        /// Registered child definition name
        definition: String,
        /// Initialization payload
        payload: serde_json::Value,
    },

    /// Register a deferred command, keyed under the hook's element
    Schedule {
        /// Pre-allocated job id (returned to the hook)
        job_id: Uuid,
        /// Delay before the command fires
        delay: Duration,
        /// Command to execute after commit + delay
        command: Command,
    },

    /// Cancel a previously registered deferred job
    CancelScheduled {
        /// Job id returned by `schedule`
        job_id: Uuid,
    },

    /// Write a routing-hint flag on the owning workflow
    SetFlag {
        /// Flag key
        key: String,
        /// Flag value
        value: serde_json::Value,
    },
}

/// Context provided to activity hooks
///
/// Identifies the element the hook fires for and carries a read snapshot of
/// the workflow's flags. Mutating methods enqueue [`ActivityRequest`]s.
#[derive(Debug)]
pub struct ActivityContext {
    workflow_id: Uuid,
    root_id: Uuid,
    task: Option<(String, u32)>,
    work_item_id: Option<Uuid>,
    flags: serde_json::Map<String, serde_json::Value>,
    payload: serde_json::Value,
    requests: Vec<ActivityRequest>,
}

impl ActivityContext {
    /// Context for a workflow-level hook
    pub(crate) fn for_workflow(workflow_id: Uuid, root_id: Uuid) -> Self {
        Self {
            workflow_id,
            root_id,
            task: None,
            work_item_id: None,
            flags: serde_json::Map::new(),
            payload: serde_json::Value::Null,
            requests: Vec::new(),
        }
    }

    /// Context for a task-level hook
    pub(crate) fn for_task(
        workflow_id: Uuid,
        root_id: Uuid,
        task: &str,
        generation: u32,
    ) -> Self {
        Self {
            task: Some((task.to_string(), generation)),
            ..Self::for_workflow(workflow_id, root_id)
        }
    }

    /// Context for a work-item-level hook
    pub(crate) fn for_work_item(
        workflow_id: Uuid,
        root_id: Uuid,
        task: &str,
        generation: u32,
        work_item_id: Uuid,
    ) -> Self {
        Self {
            work_item_id: Some(work_item_id),
            ..Self::for_task(workflow_id, root_id, task, generation)
        }
    }

    pub(crate) fn with_flags(
        mut self,
        flags: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        self.flags = flags;
        self
    }

    pub(crate) fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub(crate) fn take_requests(&mut self) -> Vec<ActivityRequest> {
        std::mem::take(&mut self.requests)
    }

    /// Workflow the hook fires in
    pub fn workflow_id(&self) -> Uuid {
        self.workflow_id
    }

    /// Root workflow of the family (the trace id)
    pub fn root_id(&self) -> Uuid {
        self.root_id
    }

    /// Task name, for task- and work-item-level hooks
    pub fn task_name(&self) -> Option<&str> {
        self.task.as_ref().map(|(name, _)| name.as_str())
    }

    /// Task generation, for task- and work-item-level hooks
    pub fn generation(&self) -> Option<u32> {
        self.task.as_ref().map(|(_, gen)| *gen)
    }

    /// Work item id, for work-item-level hooks
    pub fn work_item_id(&self) -> Option<Uuid> {
        self.work_item_id
    }

    /// Payload of the transition this hook observes (Null when none)
    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// Read a routing-hint flag
    pub fn flag(&self, key: &str) -> Option<&serde_json::Value> {
        self.flags.get(key)
    }

    /// Write a routing-hint flag on the owning workflow
    pub fn set_flag(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.requests.push(ActivityRequest::SetFlag {
            key: key.into(),
            value,
        });
    }

    /// Initialize a work item on this task
    pub fn initialize_work_item(&mut self, payload: serde_json::Value) {
        self.requests.push(ActivityRequest::InitializeWorkItem {
            payload,
            offer: None,
        });
    }

    /// Initialize an offered (human) work item on this task
    pub fn initialize_offered_work_item(&mut self, payload: serde_json::Value, offer: Offer) {
        self.requests.push(ActivityRequest::InitializeWorkItem {
            payload,
            offer: Some(offer),
        });
    }

    /// Initialize a child workflow (dynamic composite tasks)
    ///
    /// `definition` must name one of the task's registered child
    /// definitions; the request is validated when applied.
    pub fn initialize_child(&mut self, definition: impl Into<String>, payload: serde_json::Value) {
        self.requests.push(ActivityRequest::InitializeChild {
            definition: definition.into(),
            payload,
        });
    }

    /// Register a deferred command, keyed under this hook's element
    ///
    /// Multiple registrations are additive. The returned job id can be
    /// passed to [`cancel_scheduled`](Self::cancel_scheduled); the ledger
    /// entry is reaped automatically when the element reaches a terminal
    /// state.
    pub fn schedule(&mut self, delay: Duration, command: Command) -> Uuid {
        let job_id = Uuid::now_v7();
        self.requests.push(ActivityRequest::Schedule {
            job_id,
            delay,
            command,
        });
        job_id
    }

    /// Cancel a deferred job registered earlier
    pub fn cancel_scheduled(&mut self, job_id: Uuid) {
        self.requests.push(ActivityRequest::CancelScheduled { job_id });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_context_identity() {
        let wf = Uuid::now_v7();
        let root = Uuid::now_v7();
        let ctx = ActivityContext::for_task(wf, root, "review", 3);

        assert_eq!(ctx.workflow_id(), wf);
        assert_eq!(ctx.root_id(), root);
        assert_eq!(ctx.task_name(), Some("review"));
        assert_eq!(ctx.generation(), Some(3));
        assert_eq!(ctx.work_item_id(), None);
    }

    #[test]
    fn test_requests_accumulate_in_order() {
        let mut ctx = ActivityContext::for_task(Uuid::now_v7(), Uuid::now_v7(), "review", 1);
        ctx.initialize_work_item(json!({ "n": 1 }));
        ctx.set_flag("route", json!("fast"));
        let job = ctx.schedule(
            Duration::from_millis(200),
            Command::CancelWorkflow {
                workflow_id: ctx.workflow_id(),
            },
        );
        ctx.cancel_scheduled(job);

        let requests = ctx.take_requests();
        assert_eq!(requests.len(), 4);
        assert!(matches!(
            requests[0],
            ActivityRequest::InitializeWorkItem { .. }
        ));
        assert!(matches!(requests[1], ActivityRequest::SetFlag { .. }));
        assert!(matches!(
            requests[3],
            ActivityRequest::CancelScheduled { job_id } if job_id == job
        ));
        assert!(ctx.take_requests().is_empty());
    }

    #[test]
    fn test_flags_snapshot_readable() {
        let mut flags = serde_json::Map::new();
        flags.insert("priority".to_string(), json!("high"));
        let ctx =
            ActivityContext::for_workflow(Uuid::now_v7(), Uuid::now_v7()).with_flags(flags);
        assert_eq!(ctx.flag("priority"), Some(&json!("high")));
        assert_eq!(ctx.flag("missing"), None);
    }
}
