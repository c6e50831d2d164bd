//! Runtime adapters for spawning attempt execution.

pub mod tokio_spawner;

pub use tokio_spawner::TokioSpawner;
