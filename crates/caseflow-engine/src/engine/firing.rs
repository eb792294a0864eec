//! Token firing
//!
//! Consumes input tokens when a task starts and plans/produces output
//! tokens when it completes. Routing predicates run here, inside the firing
//! transaction; their errors fail the task transition, never the tokens
//! halfway.

use std::collections::HashMap;

use tracing::debug;
use uuid::Uuid;

use super::txn::CommandTxn;
use crate::definition::{JoinKind, RoutingContext, RoutingError, SplitKind, TaskDef};
use crate::error::EngineError;

/// Consume input tokens for a firing task, per its join kind
pub(crate) fn consume_inputs(
    txn: &mut CommandTxn,
    workflow_id: Uuid,
    task: &TaskDef,
) -> Result<(), EngineError> {
    match task.join() {
        JoinKind::And => {
            for input in task.inputs() {
                txn.decrement_condition(workflow_id, input, 1)?;
            }
        }

        JoinKind::Xor => {
            let marked: Vec<&String> = task
                .inputs()
                .iter()
                .filter(|c| txn.marking(workflow_id, c).map(|m| m > 0).unwrap_or(false))
                .collect();
            if marked.len() != 1 {
                return Err(EngineError::NotEnabled {
                    workflow_id,
                    task: task.name().to_string(),
                });
            }
            let input = marked[0].clone();
            txn.decrement_condition(workflow_id, &input, 1)?;
        }

        JoinKind::Or => {
            let marked: Vec<String> = task
                .inputs()
                .iter()
                .filter(|c| txn.marking(workflow_id, c).map(|m| m > 0).unwrap_or(false))
                .cloned()
                .collect();
            if marked.is_empty() {
                return Err(EngineError::NotEnabled {
                    workflow_id,
                    task: task.name().to_string(),
                });
            }
            for input in marked {
                txn.decrement_condition(workflow_id, &input, 1)?;
            }
        }
    }

    debug!(%workflow_id, task = task.name(), "consumed input tokens");
    Ok(())
}

/// Decide which output conditions a completing task marks
///
/// Runs the routing predicate for OR/XOR splits. The returned set is
/// validated against the declared outputs and deduplicated in declaration
/// order. Computed before any completion mutation so that a routing error
/// can fail the task instead.
pub(crate) fn plan_outputs(
    txn: &CommandTxn,
    workflow_id: Uuid,
    task: &TaskDef,
) -> Result<Vec<String>, RoutingError> {
    match task.split() {
        SplitKind::And => Ok(task.outputs().to_vec()),

        SplitKind::Xor => {
            let routed = run_predicate(txn, workflow_id, task)?
                .unwrap_or_else(|| vec![task.outputs()[0].clone()]);
            let routed = validate_targets(task, routed)?;
            if routed.len() != 1 {
                return Err(RoutingError::new(
                    task.name(),
                    format!("xor split must route to exactly one output, got {}", routed.len()),
                ));
            }
            Ok(routed)
        }

        SplitKind::Or => {
            let routed =
                run_predicate(txn, workflow_id, task)?.unwrap_or_else(|| task.outputs().to_vec());
            let routed = validate_targets(task, routed)?;
            if routed.is_empty() {
                return Err(RoutingError::new(
                    task.name(),
                    "or split must route to a non-empty output set",
                ));
            }
            Ok(routed)
        }
    }
}

/// Mark the planned outputs
pub(crate) fn produce_outputs(
    txn: &mut CommandTxn,
    workflow_id: Uuid,
    targets: &[String],
) -> Result<(), EngineError> {
    for output in targets {
        txn.increment_condition(workflow_id, output, 1)?;
    }
    Ok(())
}

fn run_predicate(
    txn: &CommandTxn,
    workflow_id: Uuid,
    task: &TaskDef,
) -> Result<Option<Vec<String>>, RoutingError> {
    let Some(predicate) = &task.routing else {
        return Ok(None);
    };

    let flags = txn
        .snap
        .workflow(workflow_id)
        .map(|w| w.flags.clone())
        .unwrap_or_default();
    let marking: HashMap<String, u32> = txn
        .snap
        .conditions
        .iter()
        .filter(|((wf, _), _)| *wf == workflow_id)
        .map(|((_, name), record)| (name.clone(), record.marking))
        .collect();

    let ctx = RoutingContext {
        workflow_id,
        task: task.name(),
        outputs: task.outputs(),
        flags: &flags,
        marking: &marking,
    };
    predicate.route(&ctx).map(Some)
}

fn validate_targets(task: &TaskDef, routed: Vec<String>) -> Result<Vec<String>, RoutingError> {
    for target in &routed {
        if !task.outputs().iter().any(|o| o == target) {
            return Err(RoutingError::new(
                task.name(),
                format!("routed to undeclared output {target}"),
            ));
        }
    }
    // Dedupe, keeping declaration order.
    Ok(task
        .outputs()
        .iter()
        .filter(|o| routed.contains(o))
        .cloned()
        .collect())
}
