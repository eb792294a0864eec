//! Workflow definitions: immutable, validated net graphs
//!
//! Definitions are assembled from tagged element configurations by
//! [`WorkflowDefinitionBuilder`] and validated once at registration time.
//! At runtime the engine only ever reads them.

mod builder;
mod config;
mod net;
mod routing;
mod schema;

pub use builder::WorkflowDefinitionBuilder;
pub use config::TaskConfig;
pub use net::{CancellationRegion, JoinKind, SplitKind, TaskDef, TaskKind, WorkflowDefinition};
pub use routing::{RoutingContext, RoutingError, RoutingPredicate};
pub use schema::{ActionSchemas, PayloadSchema, WorkItemAction};

/// Errors raised while building a definition
#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    /// Two conditions share a name
    #[error("duplicate condition: {0}")]
    DuplicateCondition(String),

    /// Two tasks share a name
    #[error("duplicate task: {0}")]
    DuplicateTask(String),

    /// A task references a condition that is not declared
    #[error("task {task} references unknown condition {condition}")]
    UnknownCondition {
        /// Referencing task
        task: String,
        /// Missing condition name
        condition: String,
    },

    /// A cancellation region references an element that is not declared
    #[error("cancellation region of {task} references unknown element {element}")]
    UnknownRegionElement {
        /// Declaring task
        task: String,
        /// Missing task or condition name
        element: String,
    },

    /// No start condition was designated
    #[error("definition {0} has no start condition")]
    MissingStartCondition(String),

    /// No end condition was designated
    #[error("definition {0} has no end condition")]
    MissingEndCondition(String),

    /// A task has no input conditions
    #[error("task {0} has no input conditions")]
    NoInputs(String),

    /// A task has no output conditions
    #[error("task {0} has no output conditions")]
    NoOutputs(String),

    /// Two child definitions of a dynamic composite share a name
    #[error("task {task} registers duplicate child definition {child}")]
    DuplicateChild {
        /// Declaring task
        task: String,
        /// Duplicated child definition name
        child: String,
    },

    /// A declared payload schema did not compile
    #[error("invalid schema for {action} on {element}: {message}")]
    InvalidSchema {
        /// Element the schema was declared on
        element: String,
        /// Action name
        action: String,
        /// Compiler message
        message: String,
    },
}
