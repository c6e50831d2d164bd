//! Durability gateway: persisted identity snapshots and storage backends.

pub mod json_file;
pub mod memory;

pub use json_file::JsonFileStore;
pub use memory::InMemoryStore;

use serde::{Deserialize, Serialize};

use crate::core::DisposerError;

/// One persisted backlog entry.
///
/// Carries enough to re-locate the resource after a restart, never the
/// transient attempt state: the last outcome and the in-progress flag are
/// meaningless in a new process and always reset on recovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedEntry {
    /// Codec tag of the producer type.
    pub kind: String,
    /// Diagnostic label retained so a lost resource can still be named.
    pub label: String,
    /// Registration time in milliseconds since the Unix epoch.
    pub registered_at_ms: u128,
    /// Producer payload; `None` when encoding failed at save time.
    pub payload: Option<serde_json::Value>,
}

/// Point-in-time identity snapshot of the backlog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BacklogSnapshot {
    /// Persisted entries, one per tracked item.
    pub entries: Vec<PersistedEntry>,
}

/// External persistence mechanism for the identity snapshot.
///
/// Failures on either side are non-fatal to the engine: they are logged and
/// the engine continues with its in-memory state. An unpersisted change is
/// retried at the next structural change or sweep.
pub trait SnapshotStore: Send + Sync {
    /// Persist a snapshot, replacing any previous one.
    ///
    /// # Errors
    ///
    /// [`DisposerError::Store`] when the backend cannot write.
    fn save(&self, snapshot: &BacklogSnapshot) -> Result<(), DisposerError>;

    /// Load the previously persisted snapshot, if any.
    ///
    /// # Errors
    ///
    /// [`DisposerError::Store`] when the backend cannot read or parse.
    fn load(&self) -> Result<Option<BacklogSnapshot>, DisposerError>;
}
