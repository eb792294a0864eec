//! Command transactions — the marking store
//!
//! A `CommandTxn` buffers every mutation of one command against the loaded
//! family snapshot: token moves, state writes, stats updates, ledger
//! changes and the audit spans describing them. Nothing touches the store
//! until the executor commits the finished transaction; dropping it aborts
//! everything. Invariant checks live here because this is the only place
//! markings and states are written.

use std::time::Duration;

use chrono::Utc;
use tracing::trace;
use uuid::Uuid;

use crate::audit::{AuditSpan, ConditionOp, SpanAttributes};
use crate::engine::Command;
use crate::error::EngineError;
use crate::model::{
    Claim, TaskRecord, TaskState, TaskStats, WorkItemRecord, WorkItemState, WorkItemTotals,
    WorkflowRecord, WorkflowState,
};
use crate::persistence::FamilySnapshot;
use crate::scheduler::{ScheduledEntry, ScheduledKey};

/// A deferred job to arm after commit
#[derive(Debug)]
pub(crate) struct PendingJob {
    pub job_id: Uuid,
    pub delay: Duration,
    pub command: Command,
}

/// Everything a finished transaction hands to the committer
pub(crate) struct FinishedTxn {
    pub snapshot: FamilySnapshot,
    pub expected_revision: u64,
    pub spans: Vec<AuditSpan>,
    pub pending_jobs: Vec<PendingJob>,
    pub canceled_jobs: Vec<Uuid>,
}

/// One command's in-flight transaction
pub(crate) struct CommandTxn {
    pub(crate) snap: FamilySnapshot,
    expected_revision: u64,
    spans: Vec<AuditSpan>,
    scope_stack: Vec<Uuid>,
    dirty: bool,
    pending_jobs: Vec<PendingJob>,
    canceled_jobs: Vec<Uuid>,
    default_stats_shards: u32,
}

impl CommandTxn {
    /// Transaction creating a brand-new family
    pub fn create(root_id: Uuid, default_stats_shards: u32) -> Self {
        Self::with_snapshot(FamilySnapshot::new(root_id), default_stats_shards)
    }

    /// Transaction over a loaded family
    pub fn load(snapshot: FamilySnapshot, default_stats_shards: u32) -> Self {
        Self::with_snapshot(snapshot, default_stats_shards)
    }

    fn with_snapshot(snapshot: FamilySnapshot, default_stats_shards: u32) -> Self {
        Self {
            expected_revision: snapshot.revision,
            snap: snapshot,
            spans: Vec::new(),
            scope_stack: Vec::new(),
            dirty: false,
            pending_jobs: Vec::new(),
            canceled_jobs: Vec::new(),
            default_stats_shards,
        }
    }

    /// Whether any mutation was recorded
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Hand the buffered state to the committer
    pub fn finish(self) -> FinishedTxn {
        FinishedTxn {
            snapshot: self.snap,
            expected_revision: self.expected_revision,
            spans: self.spans,
            pending_jobs: self.pending_jobs,
            canceled_jobs: self.canceled_jobs,
        }
    }

    // =========================================================================
    // Spans
    // =========================================================================

    fn push_span(
        &mut self,
        workflow_id: Option<Uuid>,
        resource_id: String,
        resource_name: String,
        operation: &str,
        attributes: SpanAttributes,
    ) -> Uuid {
        let now = Utc::now();
        let id = Uuid::now_v7();
        self.spans.push(AuditSpan {
            id,
            parent_id: self.scope_stack.last().copied(),
            trace_id: self.snap.root_id,
            workflow_id,
            resource_id,
            resource_name,
            operation: operation.to_string(),
            depth: self.scope_stack.len() as u32,
            started_at: now,
            ended_at: now,
            attributes,
        });
        id
    }

    /// Open a nesting span (command root or cascade scope)
    pub fn open_scope(
        &mut self,
        workflow_id: Option<Uuid>,
        resource_id: String,
        resource_name: String,
        operation: &str,
        attributes: SpanAttributes,
    ) -> Uuid {
        let id = self.push_span(workflow_id, resource_id, resource_name, operation, attributes);
        self.scope_stack.push(id);
        id
    }

    /// Close a nesting span opened with [`open_scope`](Self::open_scope)
    pub fn close_scope(&mut self, span_id: Uuid) {
        debug_assert_eq!(self.scope_stack.last(), Some(&span_id));
        self.scope_stack.retain(|id| *id != span_id);
        if let Some(span) = self.spans.iter_mut().rev().find(|s| s.id == span_id) {
            span.ended_at = Utc::now();
        }
    }

    /// Record a leaf span for a mutation and mark the transaction dirty
    fn record(
        &mut self,
        workflow_id: Option<Uuid>,
        resource_id: String,
        resource_name: String,
        operation: &str,
        attributes: SpanAttributes,
    ) {
        self.dirty = true;
        self.push_span(workflow_id, resource_id, resource_name, operation, attributes);
    }

    /// Record an activity hook invocation
    pub fn record_activity(&mut self, workflow_id: Uuid, hook: &str) {
        self.record(
            Some(workflow_id),
            workflow_id.to_string(),
            hook.to_string(),
            hook,
            SpanAttributes::Activity {
                hook: hook.to_string(),
            },
        );
    }

    // =========================================================================
    // Workflows
    // =========================================================================

    /// Insert a workflow record and span its initial state
    pub fn insert_workflow(&mut self, record: WorkflowRecord) {
        self.record(
            Some(record.id),
            record.id.to_string(),
            record.definition_name.clone(),
            "workflow.initialize",
            SpanAttributes::Workflow {
                state: record.state,
                definition: record.definition_name.clone(),
                parent_workflow_id: record.parent.as_ref().map(|p| p.workflow_id),
                parent_task: record.parent.as_ref().map(|p| p.task_name.clone()),
            },
        );
        self.snap.workflows.insert(record.id, record);
    }

    /// Transition a workflow's state
    pub fn set_workflow_state(
        &mut self,
        workflow_id: Uuid,
        state: WorkflowState,
        operation: &str,
    ) -> Result<(), EngineError> {
        let (definition, parent_wf, parent_task) = {
            let record = self.workflow(workflow_id)?;
            (
                record.definition_name.clone(),
                record.parent.as_ref().map(|p| p.workflow_id),
                record.parent.as_ref().map(|p| p.task_name.clone()),
            )
        };

        self.record(
            Some(workflow_id),
            workflow_id.to_string(),
            definition.clone(),
            operation,
            SpanAttributes::Workflow {
                state,
                definition,
                parent_workflow_id: parent_wf,
                parent_task,
            },
        );

        let now = Utc::now();
        let record = self
            .snap
            .workflows
            .get_mut(&workflow_id)
            .expect("checked above");
        record.state = state;
        if state.is_terminal() {
            record.completed_at = Some(now);
        }
        Ok(())
    }

    /// Write a routing-hint flag on a workflow
    pub fn set_flag(
        &mut self,
        workflow_id: Uuid,
        key: String,
        value: serde_json::Value,
    ) -> Result<(), EngineError> {
        self.workflow(workflow_id)?;
        self.dirty = true;
        self.snap
            .workflows
            .get_mut(&workflow_id)
            .expect("checked above")
            .flags
            .insert(key, value);
        Ok(())
    }

    /// Read a workflow record
    pub fn workflow(&self, workflow_id: Uuid) -> Result<&WorkflowRecord, EngineError> {
        self.snap
            .workflow(workflow_id)
            .ok_or_else(|| EngineError::Store(crate::persistence::StoreError::WorkflowNotFound(workflow_id)))
    }

    // =========================================================================
    // Conditions
    // =========================================================================

    /// Insert an empty condition (no span: no marking changed)
    pub fn insert_condition(&mut self, workflow_id: Uuid, name: &str) {
        self.dirty = true;
        self.snap.conditions.insert(
            (workflow_id, name.to_string()),
            crate::model::ConditionRecord::new(workflow_id, name, Utc::now()),
        );
    }

    /// Current marking of a condition
    pub fn marking(&self, workflow_id: Uuid, name: &str) -> Result<u32, EngineError> {
        self.snap
            .condition(workflow_id, name)
            .map(|c| c.marking)
            .ok_or_else(|| {
                EngineError::InvariantViolation(format!(
                    "condition {name} does not exist in workflow {workflow_id}"
                ))
            })
    }

    fn write_marking(
        &mut self,
        workflow_id: Uuid,
        name: &str,
        before: u32,
        after: u32,
        op: ConditionOp,
    ) {
        let operation = match op {
            ConditionOp::IncrementMarking => "condition.incrementMarking",
            ConditionOp::DecrementMarking => "condition.decrementMarking",
        };
        self.record(
            Some(workflow_id),
            format!("{workflow_id}/{name}"),
            name.to_string(),
            operation,
            SpanAttributes::Condition {
                operation: op,
                marking_before: before,
                marking_after: after,
            },
        );

        let record = self
            .snap
            .conditions
            .get_mut(&(workflow_id, name.to_string()))
            .expect("marking read before write");
        record.marking = after;
        record.updated_at = Utc::now();
        trace!(%workflow_id, condition = name, before, after, "marking changed");
    }

    /// Add tokens to a condition
    pub fn increment_condition(
        &mut self,
        workflow_id: Uuid,
        name: &str,
        delta: u32,
    ) -> Result<(), EngineError> {
        let before = self.marking(workflow_id, name)?;
        self.write_marking(
            workflow_id,
            name,
            before,
            before + delta,
            ConditionOp::IncrementMarking,
        );
        Ok(())
    }

    /// Remove tokens from a condition
    pub fn decrement_condition(
        &mut self,
        workflow_id: Uuid,
        name: &str,
        delta: u32,
    ) -> Result<(), EngineError> {
        let before = self.marking(workflow_id, name)?;
        let after = before.checked_sub(delta).ok_or_else(|| {
            EngineError::InvariantViolation(format!(
                "decrement of {delta} would drive condition {name} below zero (marking {before})"
            ))
        })?;
        self.write_marking(workflow_id, name, before, after, ConditionOp::DecrementMarking);
        Ok(())
    }

    /// Drop a condition's marking to zero (cancellation regions)
    pub fn clear_condition(&mut self, workflow_id: Uuid, name: &str) -> Result<bool, EngineError> {
        let before = self.marking(workflow_id, name)?;
        if before == 0 {
            return Ok(false);
        }
        self.write_marking(workflow_id, name, before, 0, ConditionOp::DecrementMarking);
        Ok(true)
    }

    // =========================================================================
    // Tasks
    // =========================================================================

    /// Insert a disabled task record (no span until it changes state)
    pub fn insert_task(&mut self, workflow_id: Uuid, name: &str) {
        self.dirty = true;
        self.snap.tasks.insert(
            (workflow_id, name.to_string()),
            TaskRecord::new(workflow_id, name, Utc::now()),
        );
    }

    /// Read a task record
    pub fn task(&self, workflow_id: Uuid, name: &str) -> Result<&TaskRecord, EngineError> {
        self.snap.task(workflow_id, name).ok_or_else(|| {
            EngineError::InvariantViolation(format!(
                "task {name} does not exist in workflow {workflow_id}"
            ))
        })
    }

    /// Increment a task's generation (entering a new firing cycle)
    pub fn bump_generation(
        &mut self,
        workflow_id: Uuid,
        name: &str,
        stats_shards: Option<u32>,
    ) -> Result<u32, EngineError> {
        self.task(workflow_id, name)?;
        self.dirty = true;
        let record = self
            .snap
            .tasks
            .get_mut(&(workflow_id, name.to_string()))
            .expect("checked above");
        record.generation += 1;
        let generation = record.generation;

        let shards = stats_shards.unwrap_or(self.default_stats_shards);
        self.snap.stats.insert(
            (workflow_id, name.to_string(), generation),
            TaskStats::new(shards),
        );
        Ok(generation)
    }

    /// Transition a task's state
    pub fn set_task_state(
        &mut self,
        workflow_id: Uuid,
        name: &str,
        state: TaskState,
    ) -> Result<(), EngineError> {
        let generation = self.task(workflow_id, name)?.generation;
        let operation = match state {
            TaskState::Disabled => "task.disable",
            TaskState::Enabled => "task.enable",
            TaskState::Started => "task.start",
            TaskState::Completed => "task.complete",
            TaskState::Failed => "task.fail",
            TaskState::Canceled => "task.cancel",
        };
        self.record(
            Some(workflow_id),
            format!("{workflow_id}/{name}"),
            name.to_string(),
            operation,
            SpanAttributes::Task { state, generation },
        );

        let record = self
            .snap
            .tasks
            .get_mut(&(workflow_id, name.to_string()))
            .expect("checked above");
        record.state = state;
        record.updated_at = Utc::now();
        Ok(())
    }

    // =========================================================================
    // Work Items
    // =========================================================================

    /// Read a work item record
    pub fn work_item(&self, id: Uuid) -> Result<&WorkItemRecord, EngineError> {
        self.snap
            .work_items
            .get(&id)
            .ok_or_else(|| EngineError::Store(crate::persistence::StoreError::WorkItemNotFound(id)))
    }

    /// Insert a work item and count it in the stats shards
    pub fn insert_work_item(&mut self, record: WorkItemRecord) -> Result<(), EngineError> {
        if self.snap.work_items.contains_key(&record.id) {
            return Err(EngineError::InvariantViolation(format!(
                "work item {} already exists",
                record.id
            )));
        }

        self.record(
            Some(record.workflow_id),
            record.id.to_string(),
            record.task_name.clone(),
            "workItem.initialize",
            SpanAttributes::WorkItem {
                state: record.state,
                task: record.task_name.clone(),
                generation: record.task_generation,
            },
        );

        let stats_key = (
            record.workflow_id,
            record.task_name.clone(),
            record.task_generation,
        );
        if let Some(stats) = self.snap.stats.get_mut(&stats_key) {
            stats.record_insert(record.id);
        }
        self.snap.work_items.insert(record.id, record);
        Ok(())
    }

    /// Transition a work item's state
    pub fn set_work_item_state(
        &mut self,
        id: Uuid,
        state: WorkItemState,
        operation: &str,
    ) -> Result<(), EngineError> {
        let (workflow_id, task_name, generation, previous) = {
            let record = self.work_item(id)?;
            (
                record.workflow_id,
                record.task_name.clone(),
                record.task_generation,
                record.state,
            )
        };

        self.record(
            Some(workflow_id),
            id.to_string(),
            task_name.clone(),
            operation,
            SpanAttributes::WorkItem {
                state,
                task: task_name.clone(),
                generation,
            },
        );

        if let Some(stats) = self
            .snap
            .stats
            .get_mut(&(workflow_id, task_name, generation))
        {
            stats.record_transition(id, previous, state);
        }

        let record = self.snap.work_items.get_mut(&id).expect("checked above");
        record.state = state;
        record.updated_at = Utc::now();
        Ok(())
    }

    /// Store an action payload on a work item's envelope
    pub fn set_work_item_payload(
        &mut self,
        id: Uuid,
        action: crate::definition::WorkItemAction,
        payload: serde_json::Value,
    ) -> Result<(), EngineError> {
        use crate::definition::WorkItemAction;

        self.work_item(id)?;
        self.dirty = true;
        let record = self.snap.work_items.get_mut(&id).expect("checked above");
        match action {
            WorkItemAction::Initialize => record.payload.initialize = payload,
            WorkItemAction::Start => record.payload.start = Some(payload),
            WorkItemAction::Complete => record.payload.complete = Some(payload),
            WorkItemAction::Fail => record.payload.fail = Some(payload),
            WorkItemAction::Cancel => record.payload.cancel = Some(payload),
        }
        Ok(())
    }

    /// Record a claim on a work item
    pub fn set_work_item_claim(&mut self, id: Uuid, claim: Claim) -> Result<(), EngineError> {
        self.work_item(id)?;
        self.dirty = true;
        self.snap
            .work_items
            .get_mut(&id)
            .expect("checked above")
            .claim = Some(claim);
        Ok(())
    }

    /// Summed stats of one task generation
    pub fn totals(&self, workflow_id: Uuid, task_name: &str, generation: u32) -> WorkItemTotals {
        self.snap
            .stats
            .get(&(workflow_id, task_name.to_string(), generation))
            .map(TaskStats::totals)
            .unwrap_or_default()
    }

    // =========================================================================
    // Scheduled-Job Ledger
    // =========================================================================

    /// Register a deferred job under an element key (additive)
    pub fn register_scheduled(
        &mut self,
        key: ScheduledKey,
        workflow_id: Uuid,
        job_id: Uuid,
        delay: Duration,
        command: Command,
    ) {
        self.dirty = true;
        self.snap.scheduled.push(ScheduledEntry {
            key,
            workflow_id,
            job_id,
            registered_at: Utc::now(),
        });
        self.pending_jobs.push(PendingJob {
            job_id,
            delay,
            command,
        });
    }

    /// Explicitly cancel one registered job
    pub fn cancel_scheduled(&mut self, job_id: Uuid) {
        let before = self.snap.scheduled.len();
        self.snap.scheduled.retain(|e| e.job_id != job_id);
        if self.snap.scheduled.len() != before {
            self.dirty = true;
            self.canceled_jobs.push(job_id);
        }
    }

    /// Consume the ledger entry of a firing job
    ///
    /// Returns false when the entry was already reaped — the fire must then
    /// be dropped as a no-op.
    pub fn consume_scheduled(&mut self, job_id: Uuid) -> bool {
        let before = self.snap.scheduled.len();
        self.snap.scheduled.retain(|e| e.job_id != job_id);
        let consumed = self.snap.scheduled.len() != before;
        if consumed {
            self.dirty = true;
        }
        consumed
    }

    fn reap_where<F>(&mut self, predicate: F)
    where
        F: Fn(&ScheduledEntry) -> bool,
    {
        let mut reaped = Vec::new();
        self.snap.scheduled.retain(|e| {
            if predicate(e) {
                reaped.push(e.job_id);
                false
            } else {
                true
            }
        });
        if !reaped.is_empty() {
            self.dirty = true;
            self.canceled_jobs.extend(reaped);
        }
    }

    /// Reap every ledger entry under a workflow
    pub fn reap_workflow_jobs(&mut self, workflow_id: Uuid) {
        self.reap_where(|e| e.workflow_id == workflow_id);
    }

    /// Reap ledger entries keyed under one task generation
    pub fn reap_task_jobs(&mut self, workflow_id: Uuid, task: &str, generation: u32) {
        self.reap_where(|e| {
            matches!(
                &e.key,
                ScheduledKey::Task {
                    workflow_id: wf,
                    task: t,
                    generation: g,
                } if *wf == workflow_id && t == task && *g == generation
            )
        });
    }

    /// Reap ledger entries keyed under a work item
    pub fn reap_work_item_jobs(&mut self, work_item_id: Uuid) {
        self.reap_where(|e| {
            matches!(
                &e.key,
                ScheduledKey::WorkItem { work_item_id: id } if *id == work_item_id
            )
        });
    }
}
