//! Task records — transitions that can fire

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Task state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Join rule not satisfied
    Disabled,

    /// Join rule satisfied; work items may be initialized
    Enabled,

    /// Fired: input tokens consumed, work in progress
    Started,

    /// Completed; output tokens produced
    Completed,

    /// A work item failure (or routing error) failed the task
    Failed,

    /// Canceled through a cancellation region or workflow cancel
    Canceled,
}

impl TaskState {
    /// Whether this state is terminal for the current generation
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }

    /// Whether the task holds or may still consume tokens
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Enabled | Self::Started)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disabled => write!(f, "disabled"),
            Self::Enabled => write!(f, "enabled"),
            Self::Started => write!(f, "started"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Canceled => write!(f, "canceled"),
        }
    }
}

/// A task instance inside a workflow
///
/// `generation` increments every time the task becomes enabled again and
/// identifies one firing cycle: work items and stats rows are keyed by it.
/// It never decreases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Owning workflow
    pub workflow_id: Uuid,

    /// Task name, unique within the workflow
    pub name: String,

    /// Firing-cycle counter; 0 until first enablement
    pub generation: u32,

    /// Current state
    pub state: TaskState,

    /// Last state change
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    /// Create a disabled task at generation 0
    pub fn new(workflow_id: Uuid, name: &str, now: DateTime<Utc>) -> Self {
        Self {
            workflow_id,
            name: name.to_string(),
            generation: 0,
            state: TaskState::Disabled,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_state_classes() {
        assert!(TaskState::Enabled.is_active());
        assert!(TaskState::Started.is_active());
        assert!(!TaskState::Disabled.is_active());
        assert!(!TaskState::Completed.is_active());

        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(TaskState::Canceled.is_terminal());
        assert!(!TaskState::Enabled.is_terminal());
    }

    #[test]
    fn test_new_task_starts_disabled() {
        let task = TaskRecord::new(Uuid::now_v7(), "review", Utc::now());
        assert_eq!(task.state, TaskState::Disabled);
        assert_eq!(task.generation, 0);
    }
}
