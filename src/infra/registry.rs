//! Decode registry for reconstructing disposables from persisted entries.

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::{Disposable, Unrecoverable};
use crate::infra::store::PersistedEntry;

/// Decoder producing a disposable from its persisted payload.
pub type Decoder =
    Arc<dyn Fn(serde_json::Value) -> anyhow::Result<Arc<dyn Disposable>> + Send + Sync>;

/// Maps producer kind tags to decoders for crash recovery.
///
/// Decoding is an explicit step: an entry whose kind is unknown, whose
/// payload is absent, or whose decoder fails is substituted with the
/// [`Unrecoverable`] placeholder so recovery never crashes on a
/// partially-corrupt entry.
#[derive(Default, Clone)]
pub struct DisposableRegistry {
    decoders: HashMap<&'static str, Decoder>,
}

impl DisposableRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a decoder for a producer kind. The last registration for a
    /// kind wins.
    pub fn register<F>(&mut self, kind: &'static str, decoder: F)
    where
        F: Fn(serde_json::Value) -> anyhow::Result<Arc<dyn Disposable>> + Send + Sync + 'static,
    {
        self.decoders.insert(kind, Arc::new(decoder));
    }

    /// Number of registered kinds.
    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    /// Whether no decoder is registered.
    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Decode one persisted entry, substituting the placeholder on any
    /// failure so the entry drains on the next sweep.
    pub fn decode(&self, entry: &PersistedEntry) -> Arc<dyn Disposable> {
        let Some(payload) = entry.payload.clone() else {
            tracing::warn!(
                label = %entry.label,
                "persisted entry has no payload, the resource was probably leaked"
            );
            return Arc::new(Unrecoverable::new(&entry.label));
        };
        let Some(decoder) = self.decoders.get(entry.kind.as_str()) else {
            tracing::warn!(
                kind = %entry.kind,
                label = %entry.label,
                "no decoder registered for persisted entry, the resource was probably leaked"
            );
            return Arc::new(Unrecoverable::new(&entry.label));
        };
        match decoder(payload) {
            Ok(disposable) => disposable,
            Err(err) => {
                tracing::warn!(
                    kind = %entry.kind,
                    label = %entry.label,
                    error = %err,
                    "unable to decode persisted entry, the resource was probably leaked"
                );
                Arc::new(Unrecoverable::new(&entry.label))
            }
        }
    }
}
