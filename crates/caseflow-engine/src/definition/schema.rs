//! Per-action payload schemas
//!
//! Each lifecycle action may declare a JSON schema at definition time.
//! Schemas compile once at build; validation runs on every command before
//! any state is touched and reports field-path errors.

use std::collections::HashMap;
use std::sync::Arc;

use jsonschema::Validator;
use serde::{Deserialize, Serialize};

use super::DefinitionError;
use crate::error::FieldError;

/// Work-item lifecycle actions that can carry a payload schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemAction {
    Initialize,
    Start,
    Complete,
    Fail,
    Cancel,
}

impl std::fmt::Display for WorkItemAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initialize => write!(f, "initialize"),
            Self::Start => write!(f, "start"),
            Self::Complete => write!(f, "complete"),
            Self::Fail => write!(f, "fail"),
            Self::Cancel => write!(f, "cancel"),
        }
    }
}

/// A compiled payload schema
pub struct PayloadSchema {
    schema: serde_json::Value,
    validator: Validator,
}

impl PayloadSchema {
    /// Compile a JSON schema document
    pub fn compile(
        element: &str,
        action: &str,
        schema: serde_json::Value,
    ) -> Result<Self, DefinitionError> {
        let validator =
            jsonschema::validator_for(&schema).map_err(|e| DefinitionError::InvalidSchema {
                element: element.to_string(),
                action: action.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { schema, validator })
    }

    /// Validate a payload, returning every field-level failure
    pub fn validate(&self, payload: &serde_json::Value) -> Result<(), Vec<FieldError>> {
        let errors: Vec<FieldError> = self
            .validator
            .iter_errors(payload)
            .map(|e| FieldError::new(e.instance_path().to_string(), e.to_string()))
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// The source schema document
    pub fn schema(&self) -> &serde_json::Value {
        &self.schema
    }
}

impl std::fmt::Debug for PayloadSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadSchema")
            .field("schema", &self.schema)
            .finish()
    }
}

/// Schema table for one task's work-item actions
#[derive(Debug, Default, Clone)]
pub struct ActionSchemas {
    schemas: HashMap<WorkItemAction, Arc<PayloadSchema>>,
}

impl ActionSchemas {
    /// Insert a compiled schema for an action
    pub fn insert(&mut self, action: WorkItemAction, schema: Arc<PayloadSchema>) {
        self.schemas.insert(action, schema);
    }

    /// Look up the schema for an action
    pub fn get(&self, action: WorkItemAction) -> Option<&PayloadSchema> {
        self.schemas.get(&action).map(Arc::as_ref)
    }

    /// Validate a payload against the action's schema, if one is declared
    pub fn validate(
        &self,
        action: WorkItemAction,
        payload: &serde_json::Value,
    ) -> Result<(), Vec<FieldError>> {
        match self.get(action) {
            Some(schema) => schema.validate(payload),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn amount_schema() -> PayloadSchema {
        PayloadSchema::compile(
            "pay",
            "complete",
            json!({
                "type": "object",
                "properties": {
                    "amount": { "type": "number", "minimum": 0 },
                    "currency": { "type": "string" }
                },
                "required": ["amount"]
            }),
        )
        .expect("schema should compile")
    }

    #[test]
    fn test_valid_payload() {
        let schema = amount_schema();
        assert!(schema
            .validate(&json!({ "amount": 10.5, "currency": "EUR" }))
            .is_ok());
    }

    #[test]
    fn test_invalid_payload_reports_paths() {
        let schema = amount_schema();
        let errors = schema
            .validate(&json!({ "amount": -3 }))
            .expect_err("should fail");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "/amount");
    }

    #[test]
    fn test_missing_required_field() {
        let schema = amount_schema();
        let errors = schema.validate(&json!({})).expect_err("should fail");
        assert!(errors[0].message.contains("amount"));
    }

    #[test]
    fn test_bad_schema_rejected_at_compile() {
        let result = PayloadSchema::compile("t", "start", json!({ "type": "no-such-type" }));
        assert!(matches!(result, Err(DefinitionError::InvalidSchema { .. })));
    }

    #[test]
    fn test_undeclared_action_passes() {
        let schemas = ActionSchemas::default();
        assert!(schemas
            .validate(WorkItemAction::Complete, &json!({ "anything": true }))
            .is_ok());
    }
}
