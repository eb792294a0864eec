//! Cancellation: regions and workflow-wide cascades
//!
//! A region clears when its declaring task completes, and only then:
//! listed conditions drop to zero, listed tasks in {enabled, started} are
//! canceled along with their non-terminal work items. `cancelWorkflow`
//! runs the same clearing over the whole family. Cancel events always fire
//! bottom-up: work items, tasks, child workflows, composite tasks, then
//! the workflow, each exactly once; redundant cancels are no-ops.

use tracing::{debug, info};
use uuid::Uuid;

use super::executor::ExecCtx;
use super::registry::resolve_definition;
use super::txn::CommandTxn;
use crate::definition::{TaskDef, WorkflowDefinition};
use crate::error::EngineError;
use crate::model::{TaskState, WorkflowState};

impl ExecCtx<'_> {
    /// Clear the declared cancellation region of a completing task
    ///
    /// Returns the conditions whose dependents must be re-evaluated: the
    /// cleared ones plus the outputs of canceled tasks (an OR-join may
    /// unblock once a pending producer is gone).
    pub(crate) fn apply_region(
        &self,
        txn: &mut CommandTxn,
        def: &WorkflowDefinition,
        workflow_id: Uuid,
        task: &TaskDef,
        depth: u32,
    ) -> Result<Vec<String>, EngineError> {
        let Some(region) = task.region() else {
            return Ok(Vec::new());
        };
        debug!(%workflow_id, task = task.name(), "clearing cancellation region");

        let mut changed = Vec::new();
        for condition in &region.conditions {
            if txn.clear_condition(workflow_id, condition)? {
                changed.push(condition.clone());
            }
        }

        for name in &region.tasks {
            let target = self.require_task(def, name)?;
            let record = txn.task(workflow_id, name)?.clone();
            if !record.state.is_active() {
                continue;
            }
            self.cancel_task_with_items(txn, def, workflow_id, target, depth + 1)?;
            for output in target.outputs() {
                if !changed.contains(output) {
                    changed.push(output.clone());
                }
            }
        }

        Ok(changed)
    }

    /// Cancel one work item: state, ledger, `onCanceled`
    ///
    /// `notify_observer` is false inside cancellation cascades, where each
    /// element fires exactly one cancel event.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn cancel_work_item_internal(
        &self,
        txn: &mut CommandTxn,
        def: &WorkflowDefinition,
        workflow_id: Uuid,
        task: &TaskDef,
        work_item_id: Uuid,
        notify_observer: bool,
        depth: u32,
    ) -> Result<(), EngineError> {
        let item = txn.work_item(work_item_id)?.clone();
        if item.state.is_terminal() {
            return Ok(());
        }

        txn.set_work_item_state(
            work_item_id,
            crate::model::WorkItemState::Canceled,
            "workItem.cancel",
        )?;
        txn.reap_work_item_jobs(work_item_id);

        let item = txn.work_item(work_item_id)?.clone();
        self.work_item_hook(
            txn,
            def,
            task,
            &item,
            "workItem.onCanceled",
            serde_json::Value::Null,
            |acts, ctx, record| acts.on_canceled(ctx, record),
            depth,
        )?;
        if notify_observer {
            self.notify_work_item_observer(txn, def, workflow_id, task, &item, depth)?;
        }
        Ok(())
    }

    /// Cancel an active task: its work items first, then nested child
    /// workflows, then the task itself
    pub(crate) fn cancel_task_with_items(
        &self,
        txn: &mut CommandTxn,
        def: &WorkflowDefinition,
        workflow_id: Uuid,
        task: &TaskDef,
        depth: u32,
    ) -> Result<(), EngineError> {
        self.depth_guard(depth)?;

        let record = txn.task(workflow_id, task.name())?.clone();
        if !record.state.is_active() {
            return Ok(());
        }

        let pending: Vec<Uuid> = txn
            .snap
            .work_items_of(workflow_id, task.name(), record.generation)
            .into_iter()
            .filter(|i| !i.state.is_terminal())
            .map(|i| i.id)
            .collect();
        for item_id in pending {
            self.cancel_work_item_internal(txn, def, workflow_id, task, item_id, false, depth)?;
        }

        let children: Vec<Uuid> = txn
            .snap
            .children_of(workflow_id, task.name())
            .into_iter()
            .filter(|c| !c.state.is_terminal())
            .map(|c| c.id)
            .collect();
        for child_id in children {
            self.cancel_workflow_cascade(txn, child_id, depth + 1)?;
        }

        txn.set_task_state(workflow_id, task.name(), TaskState::Canceled)?;
        txn.reap_task_jobs(workflow_id, task.name(), record.generation);
        self.task_hook(
            txn,
            def,
            workflow_id,
            task,
            record.generation,
            "task.onCanceled",
            |acts, ctx| acts.on_canceled(ctx),
            depth,
        )
    }

    /// Cancel a workflow and everything it owns, leaves first
    pub(crate) fn cancel_workflow_cascade(
        &self,
        txn: &mut CommandTxn,
        workflow_id: Uuid,
        depth: u32,
    ) -> Result<(), EngineError> {
        self.depth_guard(depth)?;

        let record = txn.workflow(workflow_id)?.clone();
        if record.state.is_terminal() {
            return Ok(());
        }
        info!(%workflow_id, "canceling workflow");

        let def = resolve_definition(self.registry, &txn.snap, workflow_id)?;
        for task in def.tasks() {
            self.cancel_task_with_items(txn, &def, workflow_id, task, depth + 1)?;
        }

        for condition in def.conditions() {
            txn.clear_condition(workflow_id, condition)?;
        }

        txn.set_workflow_state(workflow_id, WorkflowState::Canceled, "workflow.cancel")?;
        txn.reap_workflow_jobs(workflow_id);
        self.workflow_hook(
            txn,
            &def,
            workflow_id,
            "workflow.onCanceled",
            serde_json::Value::Null,
            |acts, ctx| acts.on_canceled(ctx),
            depth,
        )
    }
}
