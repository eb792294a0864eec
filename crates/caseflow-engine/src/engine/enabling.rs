//! Enabling evaluation
//!
//! Decides whether a task's join rule holds against the current marking.
//! The OR-join uses a conservative satisfiability check: at least one input
//! marked, and no *direct producer* of an unmarked input still active. A
//! producer is any other task whose declared outputs include the condition.
//! Dependent tasks are re-evaluated in topological order so that chained
//! OR-joins resolve deterministically.

use std::collections::HashSet;

use uuid::Uuid;

use crate::definition::{JoinKind, TaskDef, WorkflowDefinition};
use crate::persistence::FamilySnapshot;

/// Whether `task`'s join rule is currently satisfied
pub(crate) fn is_join_satisfied(
    snap: &FamilySnapshot,
    def: &WorkflowDefinition,
    workflow_id: Uuid,
    task: &TaskDef,
) -> bool {
    let marked = |name: &str| {
        snap.condition(workflow_id, name)
            .is_some_and(|c| c.marking > 0)
    };

    match task.join() {
        JoinKind::And => task.inputs().iter().all(|c| marked(c)),

        JoinKind::Xor => task.inputs().iter().filter(|c| marked(c)).count() == 1,

        JoinKind::Or => {
            if !task.inputs().iter().any(|c| marked(c)) {
                return false;
            }
            // Hold back while a token could still arrive on a missing input.
            for input in task.inputs() {
                if marked(input) {
                    continue;
                }
                for producer in def.producers_of(input) {
                    if producer.name() == task.name() {
                        continue;
                    }
                    let active = snap
                        .task(workflow_id, producer.name())
                        .is_some_and(|t| t.state.is_active());
                    if active {
                        return false;
                    }
                }
            }
            true
        }
    }
}

/// Tasks whose enabling status might change after `changed` conditions
/// moved, deduplicated and ordered topologically
pub(crate) fn affected_tasks<'a>(
    def: &'a WorkflowDefinition,
    changed: &[String],
) -> Vec<&'a TaskDef> {
    let mut seen = HashSet::new();
    let mut tasks: Vec<&TaskDef> = Vec::new();
    for condition in changed {
        for task in def.dependents_of(condition) {
            if seen.insert(task.name().to_string()) {
                tasks.push(task);
            }
        }
    }
    tasks.sort_by_key(|t| def.topo_rank_of(t.name()));
    tasks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{SplitKind, TaskConfig, WorkflowDefinitionBuilder};
    use crate::model::{TaskState, WorkflowRecord};
    use chrono::Utc;

    fn booking_def() -> WorkflowDefinition {
        WorkflowDefinitionBuilder::new("booking", "v1")
            .start_condition("start")
            .end_condition("end")
            .conditions(["flight", "car", "hotel"])
            .task(
                TaskConfig::new("register")
                    .split(SplitKind::Or)
                    .input("start")
                    .outputs(["flight", "car", "hotel"]),
            )
            .task(
                TaskConfig::new("pay")
                    .join(JoinKind::Or)
                    .inputs(["flight", "car", "hotel"])
                    .output("end"),
            )
            .build()
            .unwrap()
    }

    fn snapshot_for(def: &WorkflowDefinition) -> (FamilySnapshot, Uuid) {
        let wf = Uuid::now_v7();
        let mut snap = FamilySnapshot::new(wf);
        snap.workflows
            .insert(wf, WorkflowRecord::new_root(wf, def.name(), "v1", Utc::now()));
        for c in def.conditions() {
            snap.conditions.insert(
                (wf, c.clone()),
                crate::model::ConditionRecord::new(wf, c, Utc::now()),
            );
        }
        for t in def.tasks() {
            snap.tasks.insert(
                (wf, t.name().to_string()),
                crate::model::TaskRecord::new(wf, t.name(), Utc::now()),
            );
        }
        (snap, wf)
    }

    fn mark(snap: &mut FamilySnapshot, wf: Uuid, name: &str, marking: u32) {
        snap.conditions
            .get_mut(&(wf, name.to_string()))
            .unwrap()
            .marking = marking;
    }

    fn set_task(snap: &mut FamilySnapshot, wf: Uuid, name: &str, state: TaskState) {
        snap.tasks.get_mut(&(wf, name.to_string())).unwrap().state = state;
    }

    #[test]
    fn test_and_join_requires_every_input() {
        let def = WorkflowDefinitionBuilder::new("and", "v1")
            .start_condition("a")
            .end_condition("end")
            .condition("b")
            .task(TaskConfig::new("t").inputs(["a", "b"]).output("end"))
            .build()
            .unwrap();
        let (mut snap, wf) = snapshot_for(&def);
        let task = def.task("t").unwrap();

        assert!(!is_join_satisfied(&snap, &def, wf, task));
        mark(&mut snap, wf, "a", 1);
        assert!(!is_join_satisfied(&snap, &def, wf, task));
        mark(&mut snap, wf, "b", 1);
        assert!(is_join_satisfied(&snap, &def, wf, task));
    }

    #[test]
    fn test_xor_join_requires_exactly_one() {
        let def = WorkflowDefinitionBuilder::new("xor", "v1")
            .start_condition("a")
            .end_condition("end")
            .condition("b")
            .task(
                TaskConfig::new("t")
                    .join(JoinKind::Xor)
                    .inputs(["a", "b"])
                    .output("end"),
            )
            .build()
            .unwrap();
        let (mut snap, wf) = snapshot_for(&def);
        let task = def.task("t").unwrap();

        mark(&mut snap, wf, "a", 1);
        assert!(is_join_satisfied(&snap, &def, wf, task));
        mark(&mut snap, wf, "b", 1);
        assert!(!is_join_satisfied(&snap, &def, wf, task));
    }

    #[test]
    fn test_or_join_waits_for_active_producer() {
        let def = booking_def();
        let (mut snap, wf) = snapshot_for(&def);
        let pay = def.task("pay").unwrap();

        // A token on `car` while `register` is still started: a token could
        // still arrive on `hotel`, so the join holds back.
        mark(&mut snap, wf, "car", 1);
        set_task(&mut snap, wf, "register", TaskState::Started);
        assert!(!is_join_satisfied(&snap, &def, wf, pay));

        // Producer settled: no further token possible.
        set_task(&mut snap, wf, "register", TaskState::Completed);
        assert!(is_join_satisfied(&snap, &def, wf, pay));
    }

    #[test]
    fn test_or_join_needs_at_least_one_token() {
        let def = booking_def();
        let (mut snap, wf) = snapshot_for(&def);
        let pay = def.task("pay").unwrap();

        set_task(&mut snap, wf, "register", TaskState::Completed);
        assert!(!is_join_satisfied(&snap, &def, wf, pay));

        mark(&mut snap, wf, "hotel", 1);
        assert!(is_join_satisfied(&snap, &def, wf, pay));
    }

    #[test]
    fn test_affected_tasks_deduplicated_and_ordered() {
        let def = booking_def();
        let affected = affected_tasks(
            &def,
            &["flight".to_string(), "car".to_string(), "hotel".to_string()],
        );
        assert_eq!(affected.len(), 1);
        assert_eq!(affected[0].name(), "pay");

        let affected = affected_tasks(&def, &["start".to_string(), "car".to_string()]);
        let names: Vec<&str> = affected.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["register", "pay"]);
    }
}
