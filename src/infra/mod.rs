//! Infrastructure adapters: durable snapshot stores and the decode registry.

pub mod registry;
pub mod store;

pub use registry::DisposableRegistry;
pub use store::{BacklogSnapshot, InMemoryStore, JsonFileStore, PersistedEntry, SnapshotStore};
