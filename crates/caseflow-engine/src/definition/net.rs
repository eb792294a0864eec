//! Validated workflow nets

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::routing::RoutingPredicate;
use super::schema::{ActionSchemas, PayloadSchema};
use crate::activity::{TaskActivities, WorkItemActivities, WorkflowActivities};
use crate::engine::CompletionPolicy;

/// How a task's input conditions combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    /// Every input condition must hold a token
    And,

    /// At least one input holds a token and no further token can arrive
    Or,

    /// Exactly one input holds a token
    Xor,
}

/// How a task marks its output conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitKind {
    /// One token to every output
    And,

    /// One token to each output chosen by the routing predicate (non-empty)
    Or,

    /// One token to exactly one output
    Xor,
}

/// Elements cleared atomically when the declaring task completes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationRegion {
    /// Tasks to cancel (those currently enabled or started)
    pub tasks: Vec<String>,

    /// Conditions whose marking drops to zero
    pub conditions: Vec<String>,
}

/// What a task's firing produces
pub enum TaskKind {
    /// Work items, created by activities or external commands
    Atomic,

    /// A single child workflow, initialized at enablement
    Composite {
        /// The child definition
        child: Arc<WorkflowDefinition>,
    },

    /// Child workflows chosen at runtime from a registered set
    Dynamic {
        /// Registered child definitions
        children: Vec<Arc<WorkflowDefinition>>,
    },
}

impl TaskKind {
    /// Whether this task drives child workflows
    pub fn is_composite(&self) -> bool {
        !matches!(self, Self::Atomic)
    }

    /// Look up a registered child definition by name
    pub fn child_named(&self, name: &str) -> Option<&Arc<WorkflowDefinition>> {
        match self {
            Self::Atomic => None,
            Self::Composite { child } => (child.name() == name).then_some(child),
            Self::Dynamic { children } => children.iter().find(|c| c.name() == name),
        }
    }
}

impl std::fmt::Debug for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Atomic => f.write_str("Atomic"),
            Self::Composite { child } => write!(f, "Composite({})", child.name()),
            Self::Dynamic { children } => {
                let names: Vec<&str> = children.iter().map(|c| c.name()).collect();
                write!(f, "Dynamic({names:?})")
            }
        }
    }
}

/// A validated task definition
pub struct TaskDef {
    pub(crate) name: String,
    pub(crate) join: JoinKind,
    pub(crate) split: SplitKind,
    pub(crate) inputs: Vec<String>,
    pub(crate) outputs: Vec<String>,
    pub(crate) kind: TaskKind,
    pub(crate) region: Option<CancellationRegion>,
    pub(crate) routing: Option<RoutingPredicate>,
    pub(crate) policy: Arc<dyn CompletionPolicy>,
    pub(crate) activities: Arc<dyn TaskActivities>,
    pub(crate) work_item_activities: Arc<dyn WorkItemActivities>,
    pub(crate) schemas: ActionSchemas,
    pub(crate) stats_shards: Option<u32>,
}

impl TaskDef {
    /// Task name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Join kind
    pub fn join(&self) -> JoinKind {
        self.join
    }

    /// Split kind
    pub fn split(&self) -> SplitKind {
        self.split
    }

    /// Input conditions, in declaration order
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    /// Output conditions, in declaration order
    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    /// Task kind
    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    /// Declared cancellation region
    pub fn region(&self) -> Option<&CancellationRegion> {
        self.region.as_ref()
    }

    /// Declared per-action payload schemas
    pub fn schemas(&self) -> &ActionSchemas {
        &self.schemas
    }
}

impl std::fmt::Debug for TaskDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDef")
            .field("name", &self.name)
            .field("join", &self.join)
            .field("split", &self.split)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("kind", &self.kind)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

/// An immutable, validated workflow definition
///
/// Built once by [`WorkflowDefinitionBuilder`](super::WorkflowDefinitionBuilder)
/// and shared behind `Arc` between the registry and any parent definitions
/// that embed it as a composite child.
pub struct WorkflowDefinition {
    pub(crate) name: String,
    pub(crate) version: String,
    pub(crate) start_condition: String,
    pub(crate) end_condition: String,
    pub(crate) conditions: Vec<String>,
    pub(crate) tasks: Vec<TaskDef>,
    pub(crate) task_index: HashMap<String, usize>,
    /// Task name -> rank in topological evaluation order
    pub(crate) topo_rank: HashMap<String, usize>,
    pub(crate) root_schema: Option<Arc<PayloadSchema>>,
    pub(crate) activities: Arc<dyn WorkflowActivities>,
}

impl WorkflowDefinition {
    /// Definition name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Version label
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Designated start condition
    pub fn start_condition(&self) -> &str {
        &self.start_condition
    }

    /// Designated end condition
    pub fn end_condition(&self) -> &str {
        &self.end_condition
    }

    /// All condition names, in declaration order
    pub fn conditions(&self) -> &[String] {
        &self.conditions
    }

    /// All tasks, in declaration order
    pub fn tasks(&self) -> &[TaskDef] {
        &self.tasks
    }

    /// Look up a task by name
    pub fn task(&self, name: &str) -> Option<&TaskDef> {
        self.task_index.get(name).map(|&i| &self.tasks[i])
    }

    /// Schema for the initialization payload, if declared
    pub fn root_schema(&self) -> Option<&PayloadSchema> {
        self.root_schema.as_deref()
    }

    /// Tasks listing `condition` among their inputs, in topological order
    ///
    /// This is the set whose enabling status might change when the
    /// condition's marking changes; topological order makes OR-join
    /// evaluation deterministic.
    pub fn dependents_of(&self, condition: &str) -> Vec<&TaskDef> {
        let mut deps: Vec<&TaskDef> = self
            .tasks
            .iter()
            .filter(|t| t.inputs.iter().any(|c| c == condition))
            .collect();
        deps.sort_by_key(|t| self.topo_rank.get(&t.name).copied().unwrap_or(usize::MAX));
        deps
    }

    /// Tasks listing `condition` among their outputs, in declaration order
    pub fn producers_of(&self, condition: &str) -> Vec<&TaskDef> {
        self.tasks
            .iter()
            .filter(|t| t.outputs.iter().any(|c| c == condition))
            .collect()
    }

    /// Rank of a task in the topological evaluation order
    pub fn topo_rank_of(&self, task: &str) -> usize {
        self.topo_rank.get(task).copied().unwrap_or(usize::MAX)
    }
}

impl std::fmt::Debug for WorkflowDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowDefinition")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("conditions", &self.conditions.len())
            .field("tasks", &self.tasks.iter().map(TaskDef::name).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
