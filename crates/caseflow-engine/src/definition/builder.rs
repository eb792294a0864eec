//! Definition builder and registration-time validation

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::config::TaskConfig;
use super::net::{TaskDef, TaskKind, WorkflowDefinition};
use super::schema::{ActionSchemas, PayloadSchema};
use super::DefinitionError;
use crate::activity::{
    NoopTaskActivities, NoopWorkItemActivities, NoopWorkflowActivities, WorkflowActivities,
};
use crate::engine::DefaultCompletionPolicy;

/// Builds a validated [`WorkflowDefinition`]
///
/// ```
/// use caseflow_engine::definition::{TaskConfig, WorkflowDefinitionBuilder};
///
/// let definition = WorkflowDefinitionBuilder::new("two_step", "v1")
///     .start_condition("start")
///     .end_condition("end")
///     .condition("mid")
///     .task(TaskConfig::new("first").input("start").output("mid"))
///     .task(TaskConfig::new("second").input("mid").output("end"))
///     .build()
///     .expect("valid definition");
///
/// assert_eq!(definition.tasks().len(), 2);
/// ```
pub struct WorkflowDefinitionBuilder {
    name: String,
    version: String,
    start: Option<String>,
    end: Option<String>,
    conditions: Vec<String>,
    tasks: Vec<TaskConfig>,
    root_schema: Option<serde_json::Value>,
    activities: Option<Arc<dyn WorkflowActivities>>,
}

impl WorkflowDefinitionBuilder {
    /// Start a new definition
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            start: None,
            end: None,
            conditions: Vec::new(),
            tasks: Vec::new(),
            root_schema: None,
            activities: None,
        }
    }

    /// Declare and designate the start condition
    pub fn start_condition(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.start = Some(name.clone());
        self.conditions.push(name);
        self
    }

    /// Declare and designate the end condition
    pub fn end_condition(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.end = Some(name.clone());
        self.conditions.push(name);
        self
    }

    /// Declare an internal condition
    pub fn condition(mut self, name: impl Into<String>) -> Self {
        self.conditions.push(name.into());
        self
    }

    /// Declare internal conditions in order
    pub fn conditions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.conditions.extend(names.into_iter().map(Into::into));
        self
    }

    /// Declare a task
    pub fn task(mut self, config: TaskConfig) -> Self {
        self.tasks.push(config);
        self
    }

    /// Declare the schema for the initialization payload
    pub fn root_schema(mut self, schema: serde_json::Value) -> Self {
        self.root_schema = Some(schema);
        self
    }

    /// Attach workflow-level activity hooks
    pub fn activities(mut self, activities: impl WorkflowActivities + 'static) -> Self {
        self.activities = Some(Arc::new(activities));
        self
    }

    /// Validate and assemble the definition
    pub fn build(self) -> Result<WorkflowDefinition, DefinitionError> {
        let start = self
            .start
            .ok_or_else(|| DefinitionError::MissingStartCondition(self.name.clone()))?;
        let end = self
            .end
            .ok_or_else(|| DefinitionError::MissingEndCondition(self.name.clone()))?;

        let mut condition_set = HashSet::new();
        for c in &self.conditions {
            if !condition_set.insert(c.clone()) {
                return Err(DefinitionError::DuplicateCondition(c.clone()));
            }
        }

        let mut task_names = HashSet::new();
        for t in &self.tasks {
            if !task_names.insert(t.name.clone()) {
                return Err(DefinitionError::DuplicateTask(t.name.clone()));
            }
        }

        // Every referenced condition and region element must be declared.
        for t in &self.tasks {
            if t.inputs.is_empty() {
                return Err(DefinitionError::NoInputs(t.name.clone()));
            }
            if t.outputs.is_empty() {
                return Err(DefinitionError::NoOutputs(t.name.clone()));
            }
            for c in t.inputs.iter().chain(t.outputs.iter()) {
                if !condition_set.contains(c) {
                    return Err(DefinitionError::UnknownCondition {
                        task: t.name.clone(),
                        condition: c.clone(),
                    });
                }
            }
            if let Some(region) = &t.region {
                for rt in &region.tasks {
                    if !task_names.contains(rt) {
                        return Err(DefinitionError::UnknownRegionElement {
                            task: t.name.clone(),
                            element: rt.clone(),
                        });
                    }
                }
                for rc in &region.conditions {
                    if !condition_set.contains(rc) {
                        return Err(DefinitionError::UnknownRegionElement {
                            task: t.name.clone(),
                            element: rc.clone(),
                        });
                    }
                }
            }
            if let TaskKind::Dynamic { children } = &t.kind {
                let mut seen = HashSet::new();
                for child in children {
                    if !seen.insert(child.name().to_string()) {
                        return Err(DefinitionError::DuplicateChild {
                            task: t.name.clone(),
                            child: child.name().to_string(),
                        });
                    }
                }
            }
        }

        let topo_rank = topological_ranks(&self.tasks);

        let mut tasks = Vec::with_capacity(self.tasks.len());
        let mut task_index = HashMap::new();
        for (i, config) in self.tasks.into_iter().enumerate() {
            let mut schemas = ActionSchemas::default();
            for (action, schema) in config.schemas {
                let compiled =
                    PayloadSchema::compile(&config.name, &action.to_string(), schema)?;
                schemas.insert(action, Arc::new(compiled));
            }

            task_index.insert(config.name.clone(), i);
            tasks.push(TaskDef {
                name: config.name,
                join: config.join,
                split: config.split,
                inputs: config.inputs,
                outputs: config.outputs,
                kind: config.kind,
                region: config.region,
                routing: config.routing,
                policy: config
                    .policy
                    .unwrap_or_else(|| Arc::new(DefaultCompletionPolicy::default())),
                activities: config
                    .activities
                    .unwrap_or_else(|| Arc::new(NoopTaskActivities)),
                work_item_activities: config
                    .work_item_activities
                    .unwrap_or_else(|| Arc::new(NoopWorkItemActivities)),
                schemas,
                stats_shards: config.stats_shards,
            });
        }

        let root_schema = match self.root_schema {
            Some(schema) => Some(Arc::new(PayloadSchema::compile(
                &self.name,
                "initializeRoot",
                schema,
            )?)),
            None => None,
        };

        Ok(WorkflowDefinition {
            name: self.name,
            version: self.version,
            start_condition: start,
            end_condition: end,
            conditions: self.conditions,
            tasks,
            task_index,
            topo_rank,
            root_schema,
            activities: self
                .activities
                .unwrap_or_else(|| Arc::new(NoopWorkflowActivities)),
        })
    }
}

/// Kahn's algorithm over the task graph (t1 -> t2 when an output of t1 is
/// an input of t2), declaration order breaking ties. Tasks left over by a
/// cycle keep declaration order after the acyclic prefix.
fn topological_ranks(tasks: &[TaskConfig]) -> HashMap<String, usize> {
    let n = tasks.len();
    let mut indegree = vec![0usize; n];
    let mut edges: Vec<Vec<usize>> = vec![Vec::new(); n];

    for (i, producer) in tasks.iter().enumerate() {
        for (j, consumer) in tasks.iter().enumerate() {
            if i == j {
                continue;
            }
            if producer
                .outputs
                .iter()
                .any(|c| consumer.inputs.contains(c))
            {
                edges[i].push(j);
                indegree[j] += 1;
            }
        }
    }

    let mut ranks = HashMap::new();
    let mut placed = vec![false; n];
    let mut next_rank = 0;

    loop {
        let Some(i) = (0..n).find(|&i| !placed[i] && indegree[i] == 0) else {
            break;
        };
        placed[i] = true;
        ranks.insert(tasks[i].name.clone(), next_rank);
        next_rank += 1;
        for &j in &edges[i] {
            indegree[j] = indegree[j].saturating_sub(1);
        }
    }

    // Cycle remainder: declaration order.
    for (i, task) in tasks.iter().enumerate() {
        if !placed[i] {
            ranks.insert(task.name.clone(), next_rank);
            next_rank += 1;
        }
    }

    ranks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{JoinKind, SplitKind};

    fn linear() -> WorkflowDefinitionBuilder {
        WorkflowDefinitionBuilder::new("linear", "v1")
            .start_condition("start")
            .end_condition("end")
            .condition("mid")
            .task(TaskConfig::new("first").input("start").output("mid"))
            .task(TaskConfig::new("second").input("mid").output("end"))
    }

    #[test]
    fn test_build_linear_definition() {
        let def = linear().build().expect("should build");
        assert_eq!(def.name(), "linear");
        assert_eq!(def.start_condition(), "start");
        assert_eq!(def.end_condition(), "end");
        assert_eq!(def.tasks().len(), 2);
        assert!(def.task("first").is_some());
        assert!(def.task("missing").is_none());
    }

    #[test]
    fn test_topological_order_follows_flow() {
        // Declared out of flow order on purpose.
        let def = WorkflowDefinitionBuilder::new("reordered", "v1")
            .start_condition("start")
            .end_condition("end")
            .condition("mid")
            .task(TaskConfig::new("late").input("mid").output("end"))
            .task(TaskConfig::new("early").input("start").output("mid"))
            .build()
            .unwrap();

        assert!(def.topo_rank_of("early") < def.topo_rank_of("late"));

        let deps = def.dependents_of("mid");
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].name(), "late");
    }

    #[test]
    fn test_unknown_condition_rejected() {
        let result = WorkflowDefinitionBuilder::new("bad", "v1")
            .start_condition("start")
            .end_condition("end")
            .task(TaskConfig::new("t").input("start").output("nowhere"))
            .build();
        assert!(matches!(
            result,
            Err(DefinitionError::UnknownCondition { .. })
        ));
    }

    #[test]
    fn test_duplicate_task_rejected() {
        let result = WorkflowDefinitionBuilder::new("bad", "v1")
            .start_condition("start")
            .end_condition("end")
            .task(TaskConfig::new("t").input("start").output("end"))
            .task(TaskConfig::new("t").input("start").output("end"))
            .build();
        assert!(matches!(result, Err(DefinitionError::DuplicateTask(_))));
    }

    #[test]
    fn test_missing_start_rejected() {
        let result = WorkflowDefinitionBuilder::new("bad", "v1")
            .end_condition("end")
            .build();
        assert!(matches!(
            result,
            Err(DefinitionError::MissingStartCondition(_))
        ));
    }

    #[test]
    fn test_task_without_inputs_rejected() {
        let result = WorkflowDefinitionBuilder::new("bad", "v1")
            .start_condition("start")
            .end_condition("end")
            .task(TaskConfig::new("floating").output("end"))
            .build();
        assert!(matches!(result, Err(DefinitionError::NoInputs(_))));
    }

    #[test]
    fn test_region_references_validated() {
        let result = WorkflowDefinitionBuilder::new("bad", "v1")
            .start_condition("start")
            .end_condition("end")
            .task(
                TaskConfig::new("t")
                    .input("start")
                    .output("end")
                    .cancellation_region(["ghost"], Vec::<String>::new()),
            )
            .build();
        assert!(matches!(
            result,
            Err(DefinitionError::UnknownRegionElement { .. })
        ));
    }

    #[test]
    fn test_or_split_keeps_declared_output_order() {
        let def = WorkflowDefinitionBuilder::new("booking", "v1")
            .start_condition("start")
            .end_condition("end")
            .conditions(["flight", "car", "hotel"])
            .task(
                TaskConfig::new("register")
                    .join(JoinKind::And)
                    .split(SplitKind::Or)
                    .input("start")
                    .outputs(["flight", "car", "hotel"]),
            )
            .task(
                TaskConfig::new("pay")
                    .join(JoinKind::Or)
                    .inputs(["flight", "car", "hotel"])
                    .output("end"),
            )
            .build()
            .unwrap();

        assert_eq!(
            def.task("register").unwrap().outputs(),
            &["flight", "car", "hotel"]
        );
        assert_eq!(def.producers_of("car")[0].name(), "register");
    }
}
