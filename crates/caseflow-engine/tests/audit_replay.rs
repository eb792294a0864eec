//! Audit trail properties: span emission, trace reconstruction, ledger
//! reaping, idempotence.

use serde_json::json;
use uuid::Uuid;

use caseflow_engine::activity::{ActivityContext, ActivityError, TaskActivities};
use caseflow_engine::audit::{ConditionOp, ResourceKind, SpanAttributes};
use caseflow_engine::definition::{TaskConfig, WorkflowDefinition, WorkflowDefinitionBuilder};
use caseflow_engine::engine::{DefinitionRegistry, Engine};
use caseflow_engine::model::{Actor, TaskState, WorkItemState, WorkflowState};
use caseflow_engine::persistence::{EngineStore, InMemoryEngineStore};

struct SeedOne;

impl TaskActivities for SeedOne {
    fn on_enabled(&self, ctx: &mut ActivityContext) -> Result<(), ActivityError> {
        ctx.initialize_work_item(json!({}));
        Ok(())
    }
}

fn linear_definition() -> WorkflowDefinition {
    WorkflowDefinitionBuilder::new("linear", "v1")
        .start_condition("start")
        .end_condition("end")
        .condition("mid")
        .task(
            TaskConfig::new("first")
                .input("start")
                .output("mid")
                .activities(SeedOne),
        )
        .task(
            TaskConfig::new("second")
                .input("mid")
                .output("end")
                .activities(SeedOne),
        )
        .build()
        .unwrap()
}

fn engine_for(def: WorkflowDefinition) -> Engine<InMemoryEngineStore> {
    let registry = DefinitionRegistry::new();
    registry.register(def).unwrap();
    Engine::start(InMemoryEngineStore::new(), registry)
}

async fn run_linear_to_completion(
    engine: &Engine<InMemoryEngineStore>,
) -> (Uuid, Vec<Uuid>) {
    let handle = engine.handle("linear", "v1").unwrap();
    let wf = handle.initialize_root(json!({})).await.unwrap();
    let mut item_ids = Vec::new();

    for task in ["first", "second"] {
        let family = engine.family(wf).await.unwrap();
        let generation = family.task(wf, task).unwrap().generation;
        let item = family.work_items_of(wf, task, generation)[0].clone();
        item_ids.push(item.id);
        handle
            .start_work_item(item.id, Actor::System, json!({}))
            .await
            .unwrap();
        handle
            .complete_work_item(item.id, Actor::System, json!({}))
            .await
            .unwrap();
    }
    (wf, item_ids)
}

#[test_log::test(tokio::test)]
async fn test_one_root_span_per_command() {
    let engine = engine_for(linear_definition());
    let (wf, _) = run_linear_to_completion(&engine).await;

    // initializeRoot + 2 x (start + complete) = 5 commands.
    let roots = engine.reader().root_spans(wf).await.unwrap();
    assert_eq!(roots.len(), 5);
    assert_eq!(roots[0].operation, "workflow.initializeRoot");
    assert_eq!(roots[1].operation, "workItem.start");
    assert_eq!(roots[4].operation, "workItem.complete");
    assert!(roots.iter().all(|s| s.trace_id == wf && s.depth == 0));

    // Mutations hang off the command's root span.
    let children = engine.reader().child_spans(wf, roots[0].id).await.unwrap();
    assert!(!children.is_empty());
    assert!(children
        .iter()
        .any(|s| s.operation == "condition.incrementMarking"));
    assert!(children.iter().any(|s| s.operation == "task.enable"));
}

#[test_log::test(tokio::test)]
async fn test_condition_spans_carry_markings() {
    let engine = engine_for(linear_definition());
    let (wf, _) = run_linear_to_completion(&engine).await;

    let spans = engine.store().trace_spans(wf).await.unwrap();
    let start_spans: Vec<_> = spans
        .iter()
        .filter(|s| s.resource_kind() == ResourceKind::Condition && s.resource_name == "start")
        .collect();

    // Marked once at initialization, consumed once at the first start.
    assert_eq!(start_spans.len(), 2);
    assert_eq!(
        start_spans[0].attributes,
        SpanAttributes::Condition {
            operation: ConditionOp::IncrementMarking,
            marking_before: 0,
            marking_after: 1,
        }
    );
    assert_eq!(
        start_spans[1].attributes,
        SpanAttributes::Condition {
            operation: ConditionOp::DecrementMarking,
            marking_before: 1,
            marking_after: 0,
        }
    );
}

#[test_log::test(tokio::test)]
async fn test_state_at_final_timestamp_matches_store() {
    let engine = engine_for(linear_definition());
    let (wf, item_ids) = run_linear_to_completion(&engine).await;

    let view = engine
        .reader()
        .workflow_state_at(wf, chrono::Utc::now())
        .await
        .unwrap();

    assert_eq!(view.workflow_state, Some(WorkflowState::Completed));
    assert_eq!(view.conditions.get("start"), Some(&0));
    assert_eq!(view.conditions.get("mid"), Some(&0));
    assert_eq!(view.conditions.get("end"), Some(&1));
    assert_eq!(view.tasks["first"].state, TaskState::Completed);
    assert_eq!(view.tasks["first"].generation, 1);
    assert_eq!(view.tasks["second"].state, TaskState::Completed);
    for id in item_ids {
        assert_eq!(view.work_items.get(&id), Some(&WorkItemState::Completed));
    }
}

#[test_log::test(tokio::test)]
async fn test_state_replay_is_time_scoped() {
    let engine = engine_for(linear_definition());
    let handle = engine.handle("linear", "v1").unwrap();

    let wf = handle.initialize_root(json!({})).await.unwrap();
    let after_init = chrono::Utc::now();

    let family = engine.family(wf).await.unwrap();
    let item = family.work_items_of(wf, "first", 1)[0].clone();
    handle
        .start_work_item(item.id, Actor::System, json!({}))
        .await
        .unwrap();

    // As of `after_init`, the start has not happened yet.
    let view = engine
        .reader()
        .workflow_state_at(wf, after_init)
        .await
        .unwrap();
    assert_eq!(view.workflow_state, Some(WorkflowState::Started));
    assert_eq!(view.conditions.get("start"), Some(&1));
    assert_eq!(view.tasks["first"].state, TaskState::Enabled);
    assert_eq!(view.work_items.get(&item.id), Some(&WorkItemState::Initialized));

    // At the present, the consumption is visible.
    let view = engine
        .reader()
        .workflow_state_at(wf, chrono::Utc::now())
        .await
        .unwrap();
    assert_eq!(view.conditions.get("start"), Some(&0));
    assert_eq!(view.tasks["first"].state, TaskState::Started);
}

#[test_log::test(tokio::test)]
async fn test_redundant_cancel_produces_no_spans() {
    let engine = engine_for(linear_definition());
    let handle = engine.handle("linear", "v1").unwrap();

    let wf = handle.initialize_root(json!({})).await.unwrap();
    handle.cancel_root(wf).await.unwrap();
    let spans_after_cancel = engine.store().span_count(wf);

    handle.cancel_root(wf).await.unwrap();
    assert_eq!(engine.store().span_count(wf), spans_after_cancel);

    // Same for a terminal work item.
    let family = engine.family(wf).await.unwrap();
    let item_id = *family.work_items.keys().next().unwrap();
    handle.cancel_work_item(item_id, json!({})).await.unwrap();
    assert_eq!(engine.store().span_count(wf), spans_after_cancel);
}

#[test_log::test(tokio::test)]
async fn test_completion_reaps_the_ledger() {
    struct SeedAndSchedule;

    impl TaskActivities for SeedAndSchedule {
        fn on_enabled(&self, ctx: &mut ActivityContext) -> Result<(), ActivityError> {
            ctx.initialize_work_item(json!({}));
            // A watchdog that would cancel the workflow much later.
            ctx.schedule(
                std::time::Duration::from_secs(3600),
                caseflow_engine::engine::Command::CancelWorkflow {
                    workflow_id: ctx.workflow_id(),
                },
            );
            Ok(())
        }
    }

    let def = WorkflowDefinitionBuilder::new("watched", "v1")
        .start_condition("start")
        .end_condition("end")
        .task(
            TaskConfig::new("t")
                .input("start")
                .output("end")
                .activities(SeedAndSchedule),
        )
        .build()
        .unwrap();
    let engine = engine_for(def);
    let handle = engine.handle("watched", "v1").unwrap();

    let wf = handle.initialize_root(json!({})).await.unwrap();
    assert_eq!(engine.family(wf).await.unwrap().scheduled.len(), 1);

    let family = engine.family(wf).await.unwrap();
    let item = family.work_items_of(wf, "t", 1)[0].clone();
    handle
        .start_work_item(item.id, Actor::System, json!({}))
        .await
        .unwrap();
    handle
        .complete_work_item(item.id, Actor::System, json!({}))
        .await
        .unwrap();

    assert_eq!(
        engine.workflow(wf).await.unwrap().state,
        WorkflowState::Completed
    );
    // The task's terminal transition reaped its watchdog.
    assert!(engine.family(wf).await.unwrap().scheduled.is_empty());
}

#[test_log::test(tokio::test)]
async fn test_recent_traces_lists_latest_first() {
    let engine = engine_for(linear_definition());

    let (first, _) = run_linear_to_completion(&engine).await;
    let (second, _) = run_linear_to_completion(&engine).await;

    let traces = engine.reader().recent_traces(10).await.unwrap();
    assert_eq!(traces.len(), 2);
    assert_eq!(traces[0].trace_id, second);
    assert_eq!(traces[1].trace_id, first);
    assert_eq!(traces[0].root_operation, "workflow.initializeRoot");
    assert!(traces[0].span_count > 0);

    let traces = engine.reader().recent_traces(1).await.unwrap();
    assert_eq!(traces.len(), 1);
}

#[test_log::test(tokio::test)]
async fn test_child_workflow_spans_share_the_root_trace() {
    let child = WorkflowDefinitionBuilder::new("sub", "v1")
        .start_condition("start")
        .end_condition("end")
        .task(
            TaskConfig::new("inner")
                .input("start")
                .output("end")
                .activities(SeedOne),
        )
        .build()
        .unwrap();
    let def = WorkflowDefinitionBuilder::new("outer", "v1")
        .start_condition("start")
        .end_condition("end")
        .task(TaskConfig::new("nested").input("start").output("end").composite(child))
        .build()
        .unwrap();
    let engine = engine_for(def);
    let handle = engine.handle("outer", "v1").unwrap();

    let root = handle.initialize_root(json!({})).await.unwrap();
    let family = engine.family(root).await.unwrap();
    let child_id = family.children_of(root, "nested")[0].id;

    let spans = engine.store().trace_spans(root).await.unwrap();
    let child_spans: Vec<_> = spans
        .iter()
        .filter(|s| s.workflow_id == Some(child_id))
        .collect();
    assert!(!child_spans.is_empty());
    assert!(child_spans.iter().all(|s| s.trace_id == root));

    // The child's workflow spans carry the composite parent pointer.
    let wf_span = child_spans
        .iter()
        .find(|s| s.operation == "workflow.initialize")
        .unwrap();
    match &wf_span.attributes {
        SpanAttributes::Workflow {
            parent_workflow_id,
            parent_task,
            ..
        } => {
            assert_eq!(*parent_workflow_id, Some(root));
            assert_eq!(parent_task.as_deref(), Some("nested"));
        }
        other => panic!("unexpected attributes {other:?}"),
    }
}
