//! Scheduled-initialization ledger entries
//!
//! Every deferred job an activity registers is recorded against the element
//! the activity ran for. Multiple entries per key are additive. Entries are
//! reaped en masse when the owning element (or an ancestor workflow)
//! reaches a terminal state; a fire whose entry is gone is a no-op.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Element a deferred job is keyed under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduledKey {
    /// Keyed under a workflow
    Workflow {
        /// Workflow id
        workflow_id: Uuid,
    },

    /// Keyed under one task generation
    Task {
        /// Owning workflow
        workflow_id: Uuid,
        /// Task name
        task: String,
        /// Generation the job was registered in
        generation: u32,
    },

    /// Keyed under a work item
    WorkItem {
        /// Work item id
        work_item_id: Uuid,
    },
}

impl ScheduledKey {
    /// Canonical string encoding (the store's index key)
    pub fn encode(&self) -> String {
        match self {
            Self::Workflow { workflow_id } => format!("workflow/{workflow_id}"),
            Self::Task {
                workflow_id,
                task,
                generation,
            } => format!("task/{workflow_id}/{task}/{generation}"),
            Self::WorkItem { work_item_id } => format!("workItem/{work_item_id}"),
        }
    }
}

impl std::fmt::Display for ScheduledKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

/// One ledger entry: a key -> deferred-job-id mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledEntry {
    /// Element the job is keyed under
    pub key: ScheduledKey,

    /// Workflow that owns the keyed element (used for en-masse reaping)
    pub workflow_id: Uuid,

    /// Deferred job id
    pub job_id: Uuid,

    /// Registration time
    pub registered_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_encoding() {
        let wf = Uuid::nil();
        assert_eq!(
            ScheduledKey::Workflow { workflow_id: wf }.encode(),
            format!("workflow/{wf}")
        );
        assert_eq!(
            ScheduledKey::Task {
                workflow_id: wf,
                task: "review".to_string(),
                generation: 2,
            }
            .encode(),
            format!("task/{wf}/review/2")
        );
    }

    #[test]
    fn test_key_serde_round_trip() {
        let key = ScheduledKey::WorkItem {
            work_item_id: Uuid::now_v7(),
        };
        let json = serde_json::to_string(&key).unwrap();
        let parsed: ScheduledKey = serde_json::from_str(&json).unwrap();
        assert_eq!(key, parsed);
    }
}
