//! The execution engine: command processing, lifecycles, firing, policies

mod cancellation;
mod command;
mod composite;
mod enabling;
mod executor;
mod firing;
mod policy;
mod registry;
mod txn;

pub use command::{ChildTarget, Command, CommandOutcome};
pub use executor::{DefinitionHandle, Engine, EngineConfig};
pub use policy::{CompletionPolicy, DefaultCompletionPolicy, PolicyDecision};
pub use registry::{DefinitionRegistry, RegistryError};
