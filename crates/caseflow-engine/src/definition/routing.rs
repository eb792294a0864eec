//! Routing predicates for OR and XOR splits
//!
//! A predicate is a pure function of the workflow context and a marking
//! snapshot, run inside the firing transaction. It returns the output
//! conditions to mark; errors fail the task transition.

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

/// Context handed to a routing predicate
#[derive(Debug)]
pub struct RoutingContext<'a> {
    /// Workflow being routed
    pub workflow_id: Uuid,

    /// Task whose split is being routed
    pub task: &'a str,

    /// Declared output conditions, in declaration order
    pub outputs: &'a [String],

    /// Routing hints written by activities
    pub flags: &'a serde_json::Map<String, serde_json::Value>,

    /// Marking snapshot of the workflow's conditions
    pub marking: &'a HashMap<String, u32>,
}

impl RoutingContext<'_> {
    /// Read a flag value
    pub fn flag(&self, key: &str) -> Option<&serde_json::Value> {
        self.flags.get(key)
    }

    /// Read a condition's marking (0 when unknown)
    pub fn marking_of(&self, condition: &str) -> u32 {
        self.marking.get(condition).copied().unwrap_or(0)
    }
}

/// Error raised by a routing predicate
#[derive(Debug, Clone, thiserror::Error)]
#[error("routing failed for task {task}: {message}")]
pub struct RoutingError {
    /// Task whose routing failed
    pub task: String,

    /// What went wrong
    pub message: String,
}

impl RoutingError {
    /// Create a new routing error
    pub fn new(task: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            message: message.into(),
        }
    }
}

type RoutingFn = dyn Fn(&RoutingContext<'_>) -> Result<Vec<String>, RoutingError> + Send + Sync;

/// A routing predicate attached to a task's split
#[derive(Clone)]
pub struct RoutingPredicate {
    inner: Arc<RoutingFn>,
}

impl RoutingPredicate {
    /// Wrap a routing function
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&RoutingContext<'_>) -> Result<Vec<String>, RoutingError> + Send + Sync + 'static,
    {
        Self { inner: Arc::new(f) }
    }

    /// Route to a fixed set of outputs
    pub fn fixed<I, S>(outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let targets: Vec<String> = outputs.into_iter().map(Into::into).collect();
        Self::new(move |_ctx| Ok(targets.clone()))
    }

    /// Evaluate the predicate
    pub fn route(&self, ctx: &RoutingContext<'_>) -> Result<Vec<String>, RoutingError> {
        (self.inner)(ctx)
    }
}

impl std::fmt::Debug for RoutingPredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RoutingPredicate(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(
        outputs: &'a [String],
        flags: &'a serde_json::Map<String, serde_json::Value>,
        marking: &'a HashMap<String, u32>,
    ) -> RoutingContext<'a> {
        RoutingContext {
            workflow_id: Uuid::now_v7(),
            task: "book",
            outputs,
            flags,
            marking,
        }
    }

    #[test]
    fn test_fixed_routing() {
        let outputs = vec!["car".to_string(), "hotel".to_string()];
        let flags = serde_json::Map::new();
        let marking = HashMap::new();

        let predicate = RoutingPredicate::fixed(["car", "hotel"]);
        let routed = predicate.route(&ctx(&outputs, &flags, &marking)).unwrap();
        assert_eq!(routed, vec!["car", "hotel"]);
    }

    #[test]
    fn test_flag_driven_routing() {
        let outputs = vec!["approve".to_string(), "reject".to_string()];
        let mut flags = serde_json::Map::new();
        flags.insert("decision".to_string(), serde_json::json!("reject"));
        let marking = HashMap::new();

        let predicate = RoutingPredicate::new(|ctx| {
            let decision = ctx
                .flag("decision")
                .and_then(|v| v.as_str())
                .ok_or_else(|| RoutingError::new(ctx.task, "decision flag missing"))?;
            Ok(vec![decision.to_string()])
        });

        let routed = predicate.route(&ctx(&outputs, &flags, &marking)).unwrap();
        assert_eq!(routed, vec!["reject"]);
    }

    #[test]
    fn test_routing_error() {
        let outputs: Vec<String> = vec![];
        let flags = serde_json::Map::new();
        let marking = HashMap::new();

        let predicate = RoutingPredicate::new(|ctx| Err(RoutingError::new(ctx.task, "boom")));
        let err = predicate
            .route(&ctx(&outputs, &flags, &marking))
            .unwrap_err();
        assert!(err.to_string().contains("boom"));
    }
}
