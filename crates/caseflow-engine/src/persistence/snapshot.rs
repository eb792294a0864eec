//! Workflow family snapshots
//!
//! A family is a root workflow plus every descendant child workflow. One
//! command loads the family, mutates it in memory, and commits it back with
//! an expected revision; parent/child navigation is by id over flat maps,
//! never by object graph.

use std::collections::HashMap;

use uuid::Uuid;

use crate::model::{ConditionRecord, TaskRecord, TaskStats, WorkItemRecord, WorkflowRecord};
use crate::scheduler::ScheduledEntry;

/// Key of a condition row: (workflow, condition name)
pub type ConditionKey = (Uuid, String);

/// Key of a task row: (workflow, task name)
pub type TaskKey = (Uuid, String);

/// Key of a stats row: (workflow, task name, generation)
pub type StatsKey = (Uuid, String, u32);

/// All persisted state of one workflow family
#[derive(Debug, Clone)]
pub struct FamilySnapshot {
    /// Root workflow id (doubles as the trace id)
    pub root_id: Uuid,

    /// Optimistic-concurrency revision; 0 for a family not yet committed
    pub revision: u64,

    /// Workflow rows by id
    pub workflows: HashMap<Uuid, WorkflowRecord>,

    /// Condition rows
    pub conditions: HashMap<ConditionKey, ConditionRecord>,

    /// Task rows
    pub tasks: HashMap<TaskKey, TaskRecord>,

    /// Work item rows by id
    pub work_items: HashMap<Uuid, WorkItemRecord>,

    /// Sharded work-item counters per task generation
    pub stats: HashMap<StatsKey, TaskStats>,

    /// Scheduled-initialization ledger
    pub scheduled: Vec<ScheduledEntry>,
}

impl FamilySnapshot {
    /// Create an empty, uncommitted family
    pub fn new(root_id: Uuid) -> Self {
        Self {
            root_id,
            revision: 0,
            workflows: HashMap::new(),
            conditions: HashMap::new(),
            tasks: HashMap::new(),
            work_items: HashMap::new(),
            stats: HashMap::new(),
            scheduled: Vec::new(),
        }
    }

    /// Look up a workflow
    pub fn workflow(&self, id: Uuid) -> Option<&WorkflowRecord> {
        self.workflows.get(&id)
    }

    /// Look up a condition
    pub fn condition(&self, workflow_id: Uuid, name: &str) -> Option<&ConditionRecord> {
        self.conditions.get(&(workflow_id, name.to_string()))
    }

    /// Look up a task
    pub fn task(&self, workflow_id: Uuid, name: &str) -> Option<&TaskRecord> {
        self.tasks.get(&(workflow_id, name.to_string()))
    }

    /// Child workflows of a composite task, oldest first
    pub fn children_of(&self, workflow_id: Uuid, task_name: &str) -> Vec<&WorkflowRecord> {
        let mut children: Vec<&WorkflowRecord> = self
            .workflows
            .values()
            .filter(|w| {
                w.parent.as_ref().is_some_and(|p| {
                    p.workflow_id == workflow_id && p.task_name == task_name
                })
            })
            .collect();
        children.sort_by_key(|w| (w.created_at, w.id));
        children
    }

    /// Work items of one task generation, oldest first
    pub fn work_items_of(
        &self,
        workflow_id: Uuid,
        task_name: &str,
        generation: u32,
    ) -> Vec<&WorkItemRecord> {
        let mut items: Vec<&WorkItemRecord> = self
            .work_items
            .values()
            .filter(|w| {
                w.workflow_id == workflow_id
                    && w.task_name == task_name
                    && w.task_generation == generation
            })
            .collect();
        items.sort_by_key(|w| (w.created_at, w.id));
        items
    }

    /// Ledger entries under a workflow
    pub fn scheduled_under_workflow(&self, workflow_id: Uuid) -> Vec<&ScheduledEntry> {
        self.scheduled
            .iter()
            .filter(|e| e.workflow_id == workflow_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ParentRef;
    use chrono::Utc;

    #[test]
    fn test_children_sorted_by_creation() {
        let root = Uuid::now_v7();
        let mut snap = FamilySnapshot::new(root);
        snap.workflows
            .insert(root, WorkflowRecord::new_root(root, "parent", "v1", Utc::now()));

        for _ in 0..3 {
            let id = Uuid::now_v7();
            snap.workflows.insert(
                id,
                WorkflowRecord::new_child(
                    id,
                    root,
                    "child",
                    "v1",
                    ParentRef {
                        workflow_id: root,
                        task_name: "spawn".to_string(),
                        task_generation: 1,
                    },
                    Utc::now(),
                ),
            );
        }

        let children = snap.children_of(root, "spawn");
        assert_eq!(children.len(), 3);
        assert!(children.windows(2).all(|w| w[0].created_at <= w[1].created_at));
        assert!(snap.children_of(root, "other").is_empty());
    }
}
