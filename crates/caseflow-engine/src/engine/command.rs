//! Commands accepted by the engine
//!
//! Every external interaction — including deferred jobs re-entering after
//! commit — is one of these. A command executes inside a single transaction
//! against the owning workflow family.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{Actor, Offer};

/// Identifies the composite task a child workflow is initialized under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildTarget {
    /// Workflow containing the composite task
    pub parent_workflow_id: Uuid,

    /// Name of the composite task
    pub parent_task_name: String,
}

/// A command against the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Create a new root workflow instance
    InitializeRoot {
        /// Definition name
        definition: String,
        /// Definition version label
        version: String,
        /// Initialization payload (validated against the root schema)
        payload: serde_json::Value,
    },

    /// Cancel a root workflow and everything under it
    CancelRoot {
        /// Root workflow id
        workflow_id: Uuid,
    },

    /// Initialize a child workflow under a dynamic composite task
    InitializeWorkflow {
        /// Name of the registered child definition
        definition: String,
        /// Composite task to attach the child to
        target: ChildTarget,
        /// Initialization payload
        payload: serde_json::Value,
    },

    /// Cancel a (child) workflow and everything under it
    CancelWorkflow {
        /// Workflow id
        workflow_id: Uuid,
    },

    /// Initialize a work item on an enabled task
    InitializeWorkItem {
        /// Owning workflow
        workflow_id: Uuid,
        /// Task name
        task: String,
        /// Initialization payload
        payload: serde_json::Value,
        /// Optional offer (human work)
        offer: Option<Offer>,
        /// Caller-supplied id; generated when absent
        work_item_id: Option<Uuid>,
    },

    /// Start an initialized work item (fires the task if still enabled)
    StartWorkItem {
        /// Work item id
        work_item_id: Uuid,
        /// Who is starting (claims offered items)
        actor: Actor,
        /// Start payload
        payload: serde_json::Value,
    },

    /// Complete a started work item
    CompleteWorkItem {
        /// Work item id
        work_item_id: Uuid,
        /// Who is completing (must hold the claim when one exists)
        actor: Actor,
        /// Completion payload
        payload: serde_json::Value,
    },

    /// Fail a started work item
    FailWorkItem {
        /// Work item id
        work_item_id: Uuid,
        /// Who is failing (must hold the claim when one exists)
        actor: Actor,
        /// Failure payload
        payload: serde_json::Value,
    },

    /// Cancel an initialized or started work item (local, never cascades up)
    CancelWorkItem {
        /// Work item id
        work_item_id: Uuid,
        /// Cancellation payload
        payload: serde_json::Value,
    },
}

impl Command {
    /// Dotted operation name used for the command's root audit span
    pub fn operation(&self) -> &'static str {
        match self {
            Self::InitializeRoot { .. } => "workflow.initializeRoot",
            Self::CancelRoot { .. } => "workflow.cancelRoot",
            Self::InitializeWorkflow { .. } => "workflow.initialize",
            Self::CancelWorkflow { .. } => "workflow.cancel",
            Self::InitializeWorkItem { .. } => "workItem.initialize",
            Self::StartWorkItem { .. } => "workItem.start",
            Self::CompleteWorkItem { .. } => "workItem.complete",
            Self::FailWorkItem { .. } => "workItem.fail",
            Self::CancelWorkItem { .. } => "workItem.cancel",
        }
    }
}

/// Result of a successfully executed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// A workflow was created
    Workflow {
        /// Id of the new workflow
        workflow_id: Uuid,
    },

    /// A work item was created
    WorkItem {
        /// Id of the new work item
        work_item_id: Uuid,
    },

    /// The command applied state changes
    Applied,

    /// The target was already terminal; nothing was written
    Noop,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_operation_names() {
        let cmd = Command::InitializeRoot {
            definition: "order".to_string(),
            version: "v1".to_string(),
            payload: serde_json::json!({}),
        };
        assert_eq!(cmd.operation(), "workflow.initializeRoot");

        let cmd = Command::CancelWorkItem {
            work_item_id: Uuid::now_v7(),
            payload: serde_json::json!({}),
        };
        assert_eq!(cmd.operation(), "workItem.cancel");
    }

    #[test]
    fn test_command_serialization() {
        let cmd = Command::StartWorkItem {
            work_item_id: Uuid::now_v7(),
            actor: Actor::participant("alice"),
            payload: serde_json::json!({ "note": "picking this up" }),
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("\"type\":\"start_work_item\""));

        let parsed: Command = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.operation(), "workItem.start");
    }
}
