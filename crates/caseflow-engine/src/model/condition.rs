//! Condition records — named token holders

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named place holding a non-negative token count
///
/// Only the firing engine and the cancellation processor mutate `marking`;
/// the unsigned type makes the marking >= 0 invariant unrepresentable to
/// violate, and decrements are range-checked before they apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionRecord {
    /// Owning workflow
    pub workflow_id: Uuid,

    /// Condition name, unique within the workflow
    pub name: String,

    /// Current token count
    pub marking: u32,

    /// Last marking change
    pub updated_at: DateTime<Utc>,
}

impl ConditionRecord {
    /// Create an empty condition
    pub fn new(workflow_id: Uuid, name: &str, now: DateTime<Utc>) -> Self {
        Self {
            workflow_id,
            name: name.to_string(),
            marking: 0,
            updated_at: now,
        }
    }

    /// Whether at least one token is present
    pub fn is_marked(&self) -> bool {
        self.marking > 0
    }
}
