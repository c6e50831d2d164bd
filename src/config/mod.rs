//! Configuration models for the disposer engine.

pub mod engine;

pub use engine::DisposerConfig;
