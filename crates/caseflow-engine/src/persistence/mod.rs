//! Persistence: the `EngineStore` contract and the in-memory implementation

mod memory;
mod snapshot;
mod store;

pub use memory::InMemoryEngineStore;
pub use snapshot::FamilySnapshot;
pub use store::{EngineStore, StoreError};
