//! Error types for disposer operations.

use thiserror::Error;

/// Errors produced by disposer components.
#[derive(Debug, Error)]
pub enum DisposerError {
    /// Engine configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// The durable snapshot could not be written or read.
    #[error("snapshot store error: {0}")]
    Store(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
