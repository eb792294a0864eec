//! Workflow instance records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Workflow instance state
///
/// Terminal states are absorbing: no command may move a workflow out of
/// `Completed`, `Failed` or `Canceled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    /// Created; conditions and tasks exist, start condition marked
    Initialized,

    /// Running
    Started,

    /// Reached its end condition with no active tasks
    Completed,

    /// A task failure propagated to the workflow
    Failed,

    /// Explicitly canceled (or canceled through an ancestor)
    Canceled,
}

impl WorkflowState {
    /// Whether this state is terminal (absorbing)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initialized => write!(f, "initialized"),
            Self::Started => write!(f, "started"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Canceled => write!(f, "canceled"),
        }
    }
}

/// Back-reference from a child workflow to the composite task that owns it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentRef {
    /// Workflow containing the composite task
    pub workflow_id: Uuid,

    /// Name of the composite task
    pub task_name: String,

    /// Generation of the composite task at child creation time
    pub task_generation: u32,
}

/// A running instantiation of a workflow definition
///
/// Child workflows share `root_id` (the trace identifier) with their
/// ancestors; parent navigation is by the embedded [`ParentRef`], never by
/// object graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRecord {
    /// Stable instance id
    pub id: Uuid,

    /// Root workflow of the family; equals `id` for roots
    pub root_id: Uuid,

    /// Definition name
    pub definition_name: String,

    /// Definition version label
    pub version: String,

    /// Current state
    pub state: WorkflowState,

    /// Composite-task back-reference (None for roots)
    pub parent: Option<ParentRef>,

    /// Free-form routing hints written by activities
    pub flags: serde_json::Map<String, serde_json::Value>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Set when a terminal state is reached
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowRecord {
    /// Create a new root workflow record
    pub fn new_root(id: Uuid, definition_name: &str, version: &str, now: DateTime<Utc>) -> Self {
        Self {
            id,
            root_id: id,
            definition_name: definition_name.to_string(),
            version: version.to_string(),
            state: WorkflowState::Initialized,
            parent: None,
            flags: serde_json::Map::new(),
            created_at: now,
            completed_at: None,
        }
    }

    /// Create a new child workflow record under a composite task
    pub fn new_child(
        id: Uuid,
        root_id: Uuid,
        definition_name: &str,
        version: &str,
        parent: ParentRef,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            root_id,
            definition_name: definition_name.to_string(),
            version: version.to_string(),
            state: WorkflowState::Initialized,
            parent: Some(parent),
            flags: serde_json::Map::new(),
            created_at: now,
            completed_at: None,
        }
    }

    /// Whether this is the family root
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!WorkflowState::Initialized.is_terminal());
        assert!(!WorkflowState::Started.is_terminal());
        assert!(WorkflowState::Completed.is_terminal());
        assert!(WorkflowState::Failed.is_terminal());
        assert!(WorkflowState::Canceled.is_terminal());
    }

    #[test]
    fn test_root_shares_trace_with_children() {
        let root_id = Uuid::now_v7();
        let root = WorkflowRecord::new_root(root_id, "order", "v1", Utc::now());
        assert!(root.is_root());
        assert_eq!(root.root_id, root.id);

        let child = WorkflowRecord::new_child(
            Uuid::now_v7(),
            root_id,
            "approval",
            "v1",
            ParentRef {
                workflow_id: root_id,
                task_name: "approve".to_string(),
                task_generation: 1,
            },
            Utc::now(),
        );
        assert!(!child.is_root());
        assert_eq!(child.root_id, root.id);
    }
}
