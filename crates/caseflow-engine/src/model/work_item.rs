//! Work item records and offer/claim metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Work item state
///
/// Transitions follow initialized -> started -> (completed | failed |
/// canceled); cancel is additionally allowed from initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemState {
    Initialized,
    Started,
    Completed,
    Failed,
    Canceled,
}

impl WorkItemState {
    /// Whether this state is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }
}

impl std::fmt::Display for WorkItemState {
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

/// Who is issuing a work-item command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Actor {
    /// The engine itself or a trusted system caller; bypasses claim checks
    System,

    /// A human participant identified by an opaque id
    Participant {
        /// Participant id (authentication happens outside the core)
        id: String,
    },
}

impl Actor {
    /// Convenience constructor for participant actors
    pub fn participant(id: impl Into<String>) -> Self {
        Self::Participant { id: id.into() }
    }
}

/// Who may claim an offered work item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum OfferScope {
    /// System work; no claim required
    System,

    /// Offered to a single participant
    Participant {
        /// Participant id
        id: String,
    },

    /// Offered to a group; any member may claim (membership is resolved
    /// by the caller, not the core)
    Group {
        /// Group id
        id: String,
    },
}

/// Offer metadata on a human work item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    /// Who may claim
    pub scope: OfferScope,

    /// When the offer was made
    pub offered_at: DateTime<Utc>,
}

impl Offer {
    /// Offer to a single participant
    pub fn to_participant(id: impl Into<String>) -> Self {
        Self {
            scope: OfferScope::Participant { id: id.into() },
            offered_at: Utc::now(),
        }
    }

    /// Offer to a group
    pub fn to_group(id: impl Into<String>) -> Self {
        Self {
            scope: OfferScope::Group { id: id.into() },
            offered_at: Utc::now(),
        }
    }
}

/// Claim held by the participant who started an offered work item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// Claimant participant id
    pub participant: String,

    /// When the claim was recorded
    pub claimed_at: DateTime<Utc>,
}

/// Per-action payloads carried by a work item
///
/// Each lifecycle action validates and stores its own payload; nothing is
/// overwritten, so the envelope doubles as a local audit of inputs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PayloadEnvelope {
    /// Payload supplied at initialization
    pub initialize: serde_json::Value,

    /// Payload supplied at start
    pub start: Option<serde_json::Value>,

    /// Payload supplied at completion
    pub complete: Option<serde_json::Value>,

    /// Payload supplied at failure
    pub fail: Option<serde_json::Value>,

    /// Payload supplied at cancellation
    pub cancel: Option<serde_json::Value>,
}

/// A unit of work produced by a task firing cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItemRecord {
    /// Stable id
    pub id: Uuid,

    /// Owning workflow
    pub workflow_id: Uuid,

    /// Owning task name
    pub task_name: String,

    /// Generation of the owning task at initialization time
    pub task_generation: u32,

    /// Current state
    pub state: WorkItemState,

    /// Per-action payloads
    pub payload: PayloadEnvelope,

    /// Who may claim (None for plain system work)
    pub offer: Option<Offer>,

    /// Who currently holds the item
    pub claim: Option<Claim>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last state change
    pub updated_at: DateTime<Utc>,
}

impl WorkItemRecord {
    /// Whether `actor` may complete or fail this item
    ///
    /// System actors always may; participants must hold the claim when one
    /// exists.
    pub fn permits(&self, actor: &Actor) -> bool {
        match (actor, &self.claim) {
            (Actor::System, _) => true,
            (Actor::Participant { .. }, None) => true,
            (Actor::Participant { id }, Some(claim)) => claim.participant == *id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item_with_claim(claimant: Option<&str>) -> WorkItemRecord {
        let now = Utc::now();
        WorkItemRecord {
            id: Uuid::now_v7(),
            workflow_id: Uuid::now_v7(),
            task_name: "review".to_string(),
            task_generation: 1,
            state: WorkItemState::Started,
            payload: PayloadEnvelope::default(),
            offer: claimant.map(Offer::to_participant),
            claim: claimant.map(|p| Claim {
                participant: p.to_string(),
                claimed_at: now,
            }),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_claimant_permits() {
        let item = item_with_claim(Some("alice"));
        assert!(item.permits(&Actor::participant("alice")));
        assert!(!item.permits(&Actor::participant("bob")));
        assert!(item.permits(&Actor::System));
    }

    #[test]
    fn test_unclaimed_permits_anyone() {
        let item = item_with_claim(None);
        assert!(item.permits(&Actor::participant("anyone")));
    }

    #[test]
    fn test_work_item_state_terminal() {
        assert!(!WorkItemState::Initialized.is_terminal());
        assert!(!WorkItemState::Started.is_terminal());
        assert!(WorkItemState::Completed.is_terminal());
        assert!(WorkItemState::Canceled.is_terminal());
    }
}
