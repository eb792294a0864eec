//! Engine error taxonomy
//!
//! Every command surfaces one of these categories. `Validation` and
//! `IllegalStateTransition` abort the transaction and carry structured
//! payloads suitable for form-field display; `Conflict` is retryable by the
//! caller; policy failures are *not* errors — they become normal failure
//! transitions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::activity::ActivityError;
use crate::persistence::StoreError;

/// A single field-level validation failure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldError {
    /// JSON-pointer path to the offending field (empty for the root)
    pub path: String,

    /// Human-readable message
    pub message: String,
}

impl FieldError {
    /// Create a new field error
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Errors surfaced by engine commands
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Payload did not match the action's declared schema
    #[error("payload validation failed ({} error(s))", errors.len())]
    Validation {
        /// Field-path to message mapping
        errors: Vec<FieldError>,
    },

    /// A transition was requested that is not allowed from the current state
    #[error("illegal state transition on {element}: {from} -> {requested}")]
    IllegalStateTransition {
        /// Element description, e.g. `workItem 018f…`
        element: String,
        /// Current state
        from: String,
        /// Requested state
        requested: String,
    },

    /// A mutation would violate a model invariant
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Task start or work-item start on a task that is not currently enabled
    #[error("task {task} in workflow {workflow_id} is not enabled")]
    NotEnabled {
        /// Owning workflow
        workflow_id: Uuid,
        /// Task name
        task: String,
    },

    /// Transactional conflict; the caller is expected to retry
    #[error("concurrent command conflict on workflow family {root_id}")]
    Conflict {
        /// Root workflow of the contended family
        root_id: Uuid,
    },

    /// A user-defined activity hook returned an error
    #[error("activity {hook} failed: {source}")]
    ActivityFailure {
        /// Hook name, e.g. `task.onEnabled`
        hook: String,
        /// The original activity error
        #[source]
        source: ActivityError,
    },

    /// No definition registered under this (name, version)
    #[error("unknown workflow definition {name}@{version}")]
    UnknownDefinition {
        /// Definition name
        name: String,
        /// Version label
        version: String,
    },

    /// Store error
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Create a validation error from field errors
    pub fn validation(errors: Vec<FieldError>) -> Self {
        Self::Validation { errors }
    }

    /// Whether the caller may retry the command verbatim
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_error_display() {
        let err = FieldError::new("/args/name", "is required");
        assert_eq!(err.to_string(), "/args/name: is required");

        let root = FieldError::new("", "payload must be an object");
        assert_eq!(root.to_string(), "payload must be an object");
    }

    #[test]
    fn test_validation_error_counts_fields() {
        let err = EngineError::validation(vec![
            FieldError::new("/a", "bad"),
            FieldError::new("/b", "worse"),
        ]);
        assert!(err.to_string().contains("2 error(s)"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_conflict_is_retryable() {
        let err = EngineError::Conflict {
            root_id: Uuid::nil(),
        };
        assert!(err.is_retryable());
    }
}
