//! Composite and dynamic composite task driving
//!
//! A composite task's "work" is one or more child workflow instances in
//! the same family (same trace). Child state changes mirror to the parent
//! task through `onWorkflowStateChanged`; terminal children drive the
//! parent under the complete-on-all / fail-on-any contract, with canceled
//! children canceling the task (and nothing above it).

use tracing::debug;
use uuid::Uuid;

use super::executor::ExecCtx;
use super::registry::resolve_definition;
use super::txn::CommandTxn;
use super::firing;
use crate::definition::{TaskDef, WorkflowDefinition};
use crate::error::EngineError;
use crate::model::{ParentRef, TaskState, WorkflowState};

impl ExecCtx<'_> {
    /// Initialize one child workflow under a composite task
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn initialize_child_workflow(
        &self,
        txn: &mut CommandTxn,
        parent_workflow_id: Uuid,
        parent_task: &TaskDef,
        parent_generation: u32,
        child_def: &WorkflowDefinition,
        payload: &serde_json::Value,
        depth: u32,
    ) -> Result<Uuid, EngineError> {
        self.depth_guard(depth)?;

        let child_id = Uuid::now_v7();
        debug!(
            %parent_workflow_id,
            task = parent_task.name(),
            %child_id,
            child = child_def.name(),
            "initializing child workflow"
        );

        self.instantiate_workflow(
            txn,
            child_def,
            child_id,
            Some(ParentRef {
                workflow_id: parent_workflow_id,
                task_name: parent_task.name().to_string(),
                task_generation: parent_generation,
            }),
            payload,
            depth + 1,
        )?;

        // The parent observes the running child right away.
        let parent_def = resolve_definition(self.registry, &txn.snap, parent_workflow_id)?;
        let child = txn.workflow(child_id)?.clone();
        self.task_hook(
            txn,
            &parent_def,
            parent_workflow_id,
            parent_task,
            parent_generation,
            "task.onWorkflowStateChanged",
            |acts, ctx| acts.on_workflow_state_changed(ctx, &child),
            depth,
        )?;

        // The first child fires the parent task.
        let parent_record = txn.task(parent_workflow_id, parent_task.name())?.clone();
        if parent_record.state == TaskState::Enabled {
            firing::consume_inputs(txn, parent_workflow_id, parent_task)?;
            txn.set_task_state(parent_workflow_id, parent_task.name(), TaskState::Started)?;
            self.task_hook(
                txn,
                &parent_def,
                parent_workflow_id,
                parent_task,
                parent_generation,
                "task.onStarted",
                |acts, ctx| acts.on_started(ctx),
                depth,
            )?;
            let consumed = parent_task.inputs().to_vec();
            self.propagate_marking_changes(txn, &parent_def, parent_workflow_id, &consumed, depth + 1)?;
        }

        Ok(child_id)
    }

    /// Mirror a child workflow's transition into the parent task
    ///
    /// Fires the observer hook, then drives the parent task per the
    /// children of the current generation: fail on any failure, complete
    /// when all completed, cancel when all terminal with a cancellation
    /// and no failure.
    pub(crate) fn mirror_child_transition(
        &self,
        txn: &mut CommandTxn,
        child_id: Uuid,
        depth: u32,
    ) -> Result<(), EngineError> {
        self.depth_guard(depth)?;

        let child = txn.workflow(child_id)?.clone();
        let Some(parent_ref) = child.parent.clone() else {
            return Ok(());
        };

        let parent_wf = parent_ref.workflow_id;
        let parent_record = txn.workflow(parent_wf)?.clone();
        if parent_record.state.is_terminal() {
            return Ok(());
        }

        let parent_def = resolve_definition(self.registry, &txn.snap, parent_wf)?;
        let task_def = self.require_task(&parent_def, &parent_ref.task_name)?;
        let task_record = txn.task(parent_wf, task_def.name())?.clone();

        // Stale mirror: the task moved on to another cycle or settled.
        if task_record.generation != parent_ref.task_generation
            || !task_record.state.is_active()
        {
            return Ok(());
        }

        self.task_hook(
            txn,
            &parent_def,
            parent_wf,
            task_def,
            task_record.generation,
            "task.onWorkflowStateChanged",
            |acts, ctx| acts.on_workflow_state_changed(ctx, &child),
            depth,
        )?;

        let states: Vec<WorkflowState> = txn
            .snap
            .children_of(parent_wf, task_def.name())
            .into_iter()
            .filter(|c| {
                c.parent
                    .as_ref()
                    .is_some_and(|p| p.task_generation == task_record.generation)
            })
            .map(|c| c.state)
            .collect();

        if states.contains(&WorkflowState::Failed) {
            return self.fail_task(txn, &parent_def, parent_wf, task_def, depth + 1);
        }

        let all_terminal = states.iter().all(WorkflowState::is_terminal);
        if !all_terminal {
            return Ok(());
        }

        if states.iter().all(|s| *s == WorkflowState::Completed) {
            return self.complete_task(txn, &parent_def, parent_wf, task_def, depth + 1);
        }

        // All terminal, at least one canceled: the task cancels without
        // bubbling into the parent workflow.
        debug!(
            %parent_wf,
            task = task_def.name(),
            "child cancellation mirrors to composite task"
        );
        txn.set_task_state(parent_wf, task_def.name(), TaskState::Canceled)?;
        txn.reap_task_jobs(parent_wf, task_def.name(), task_record.generation);
        self.task_hook(
            txn,
            &parent_def,
            parent_wf,
            task_def,
            task_record.generation,
            "task.onCanceled",
            |acts, ctx| acts.on_canceled(ctx),
            depth,
        )
    }
}
