//! Task configuration
//!
//! Tasks are declared as tagged configuration values (atomic, composite,
//! dynamic composite) and assembled into the validated graph at build time.

use std::sync::Arc;

use super::net::{CancellationRegion, JoinKind, SplitKind, TaskKind, WorkflowDefinition};
use super::routing::RoutingPredicate;
use super::schema::WorkItemAction;
use crate::activity::{TaskActivities, WorkItemActivities};
use crate::engine::CompletionPolicy;

/// Configuration for one task, consumed by the definition builder
pub struct TaskConfig {
    pub(crate) name: String,
    pub(crate) join: JoinKind,
    pub(crate) split: SplitKind,
    pub(crate) inputs: Vec<String>,
    pub(crate) outputs: Vec<String>,
    pub(crate) kind: TaskKind,
    pub(crate) region: Option<CancellationRegion>,
    pub(crate) routing: Option<RoutingPredicate>,
    pub(crate) policy: Option<Arc<dyn CompletionPolicy>>,
    pub(crate) activities: Option<Arc<dyn TaskActivities>>,
    pub(crate) work_item_activities: Option<Arc<dyn WorkItemActivities>>,
    pub(crate) schemas: Vec<(WorkItemAction, serde_json::Value)>,
    pub(crate) stats_shards: Option<u32>,
}

impl TaskConfig {
    /// Start configuring an atomic task with AND join and AND split
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            join: JoinKind::And,
            split: SplitKind::And,
            inputs: Vec::new(),
            outputs: Vec::new(),
            kind: TaskKind::Atomic,
            region: None,
            routing: None,
            policy: None,
            activities: None,
            work_item_activities: None,
            schemas: Vec::new(),
            stats_shards: None,
        }
    }

    /// Set the join kind
    pub fn join(mut self, join: JoinKind) -> Self {
        self.join = join;
        self
    }

    /// Set the split kind
    pub fn split(mut self, split: SplitKind) -> Self {
        self.split = split;
        self
    }

    /// Add one input condition
    pub fn input(mut self, condition: impl Into<String>) -> Self {
        self.inputs.push(condition.into());
        self
    }

    /// Add input conditions in order
    pub fn inputs<I, S>(mut self, conditions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs.extend(conditions.into_iter().map(Into::into));
        self
    }

    /// Add one output condition
    pub fn output(mut self, condition: impl Into<String>) -> Self {
        self.outputs.push(condition.into());
        self
    }

    /// Add output conditions in order
    pub fn outputs<I, S>(mut self, conditions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs.extend(conditions.into_iter().map(Into::into));
        self
    }

    /// Make this a static composite task driving `child`
    pub fn composite(mut self, child: WorkflowDefinition) -> Self {
        self.kind = TaskKind::Composite {
            child: Arc::new(child),
        };
        self
    }

    /// Make this a dynamic composite task with a registered child set
    pub fn dynamic_composite<I>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = WorkflowDefinition>,
    {
        self.kind = TaskKind::Dynamic {
            children: children.into_iter().map(Arc::new).collect(),
        };
        self
    }

    /// Declare the cancellation region cleared when this task completes
    pub fn cancellation_region<T, C>(mut self, tasks: T, conditions: C) -> Self
    where
        T: IntoIterator,
        T::Item: Into<String>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        self.region = Some(CancellationRegion {
            tasks: tasks.into_iter().map(Into::into).collect(),
            conditions: conditions.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Attach a routing predicate for OR/XOR splits
    pub fn routing(mut self, predicate: RoutingPredicate) -> Self {
        self.routing = Some(predicate);
        self
    }

    /// Override the completion policy
    pub fn policy(mut self, policy: impl CompletionPolicy + 'static) -> Self {
        self.policy = Some(Arc::new(policy));
        self
    }

    /// Attach task-level activity hooks
    pub fn activities(mut self, activities: impl TaskActivities + 'static) -> Self {
        self.activities = Some(Arc::new(activities));
        self
    }

    /// Attach work-item-level activity hooks
    pub fn work_item_activities(
        mut self,
        activities: impl WorkItemActivities + 'static,
    ) -> Self {
        self.work_item_activities = Some(Arc::new(activities));
        self
    }

    /// Declare a payload schema for a work-item action
    pub fn action_schema(mut self, action: WorkItemAction, schema: serde_json::Value) -> Self {
        self.schemas.push((action, schema));
        self
    }

    /// Override the statistics shard count for this task
    pub fn stats_shards(mut self, shards: u32) -> Self {
        self.stats_shards = Some(shards);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = TaskConfig::new("review");
        assert_eq!(config.name, "review");
        assert_eq!(config.join, JoinKind::And);
        assert_eq!(config.split, SplitKind::And);
        assert!(matches!(config.kind, TaskKind::Atomic));
        assert!(config.inputs.is_empty());
    }

    #[test]
    fn test_fluent_configuration() {
        let config = TaskConfig::new("book")
            .join(JoinKind::Xor)
            .split(SplitKind::Or)
            .input("registered")
            .outputs(["flight", "car", "hotel"])
            .stats_shards(8);

        assert_eq!(config.join, JoinKind::Xor);
        assert_eq!(config.split, SplitKind::Or);
        assert_eq!(config.inputs, vec!["registered"]);
        assert_eq!(config.outputs, vec!["flight", "car", "hotel"]);
        assert_eq!(config.stats_shards, Some(8));
    }
}
