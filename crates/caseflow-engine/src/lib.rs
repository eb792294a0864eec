//! # Caseflow Execution Engine
//!
//! A workflow execution engine modeled as a colored/extended Petri net:
//! conditions hold tokens, tasks fire against AND/OR/XOR joins and splits,
//! and every externally driven change — initialize/start/complete/fail/
//! cancel of workflows, tasks and work items — advances state inside one
//! transaction against a pluggable store.
//!
//! ## Features
//!
//! - **Marking semantics**: non-negative token counts, generation-scoped
//!   firing cycles, deterministic enablement waves in topological order
//! - **Composite workflows**: a task's work can be a child workflow
//!   (static) or a runtime-chosen set of them (dynamic), mirrored back
//!   into the parent task
//! - **Cancellation regions**: declared sets of tasks and conditions
//!   cleared atomically when the declaring task completes
//! - **Work items**: human/system units of work with offer/claim metadata
//!   and per-action payload schemas
//! - **Scheduled-job ledger**: deferred commands keyed per element,
//!   reaped on terminal transitions
//! - **Causal audit trail**: a span per mutation with parent/trace links
//!   and point-in-time state reconstruction
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Engine                             │
//! │   (per-root serialization, command transactions, hooks)     │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        EngineStore                          │
//! │   (family snapshots, optimistic commits, audit spans)       │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TokioJobScheduler                       │
//! │   (deferred commands re-entering the engine after commit)   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use caseflow_engine::prelude::*;
//! use serde_json::json;
//!
//! let definition = WorkflowDefinitionBuilder::new("two_step", "v1")
//!     .start_condition("start")
//!     .end_condition("end")
//!     .condition("mid")
//!     .task(TaskConfig::new("first").input("start").output("mid"))
//!     .task(TaskConfig::new("second").input("mid").output("end"))
//!     .build()?;
//!
//! let registry = DefinitionRegistry::new();
//! registry.register(definition)?;
//!
//! let engine = Engine::start(InMemoryEngineStore::new(), registry);
//! let handle = engine.handle("two_step", "v1")?;
//! let workflow_id = handle.initialize_root(json!({})).await?;
//! ```

pub mod activity;
pub mod audit;
pub mod definition;
pub mod engine;
pub mod error;
pub mod model;
pub mod persistence;
pub mod scheduler;

/// Prelude for common imports
pub mod prelude {
    pub use crate::activity::{
        ActivityContext, ActivityError, TaskActivities, WorkItemActivities, WorkflowActivities,
    };
    pub use crate::audit::{AuditSpan, TraceReader, WorkflowStateView};
    pub use crate::definition::{
        JoinKind, RoutingPredicate, SplitKind, TaskConfig, WorkItemAction,
        WorkflowDefinitionBuilder,
    };
    pub use crate::engine::{
        ChildTarget, Command, CommandOutcome, DefaultCompletionPolicy, DefinitionHandle,
        DefinitionRegistry, Engine, EngineConfig,
    };
    pub use crate::error::{EngineError, FieldError};
    pub use crate::model::{
        Actor, Offer, TaskState, WorkItemState, WorkflowState,
    };
    pub use crate::persistence::{EngineStore, InMemoryEngineStore, StoreError};
}

// Re-export key types at crate root
pub use activity::{ActivityContext, ActivityError};
pub use definition::{TaskConfig, WorkflowDefinitionBuilder};
pub use engine::{Command, DefinitionHandle, DefinitionRegistry, Engine, EngineConfig};
pub use error::{EngineError, FieldError};
pub use persistence::{EngineStore, InMemoryEngineStore, StoreError};
