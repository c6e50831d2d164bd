//! Disposable capability and attempt outcomes.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

/// Result of one disposal attempt.
///
/// Producers normally report `Pending`, `Purged` or `Failed`; `Thrown` is
/// produced at the dispatcher boundary when an attempt returns an error or
/// panics, with the error retained for reporting.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Not yet disposed; keep retrying.
    Pending,
    /// Resource confirmed gone; stop tracking.
    Purged,
    /// Attempt raised an error; retried later.
    Thrown(Arc<anyhow::Error>),
    /// Attempt reported a textual failure without an error object.
    Failed(String),
}

impl Outcome {
    /// Reporting string shown on the management surface.
    pub fn display_text(&self) -> String {
        match self {
            Self::Pending => "To dispose".into(),
            Self::Purged => "Purged successfully".into(),
            Self::Thrown(err) => format!("Failed: {err:#}"),
            Self::Failed(reason) => format!("Failed: {reason}"),
        }
    }

    /// True for the terminal variant.
    #[must_use]
    pub const fn is_purged(&self) -> bool {
        matches!(self, Self::Purged)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_text())
    }
}

/// Wrapper for one external resource to be deleted.
///
/// [`dispose`](Self::dispose) is called periodically on the resource until
/// [`Outcome::Purged`] is returned. Errors returned by the method are kept
/// and reported to the operator.
///
/// Implementations should report success even in case the resource turned out
/// to be gone already: that is expected when an operator removes the resource
/// by hand after failed attempts were reported.
///
/// If the resource outlives a process restart, the implementation must be
/// able to re-locate it from the payload produced by
/// [`encode`](Self::encode) once decoded through the registry.
#[async_trait]
pub trait Disposable: Send + Sync + 'static {
    /// Attempt to dispose the resource once.
    ///
    /// # Errors
    ///
    /// Any error is retained on the tracked item as [`Outcome::Thrown`] and
    /// the attempt is retried on the next sweep.
    async fn dispose(&self) -> anyhow::Result<Outcome>;

    /// Human-meaningful description of the exact resource being disposed.
    ///
    /// Operators are supposed to understand what kind of resource and what
    /// exact resource is being disposed from this text.
    fn display_name(&self) -> String;

    /// Stable tag identifying the producer type.
    ///
    /// Used as the codec kind for persistence and as the equality namespace
    /// for deduplication.
    fn kind(&self) -> &'static str;

    /// Producer-defined logical identity within the kind.
    ///
    /// Two disposables with the same `kind` and `dedup_key` are treated as
    /// the same logical resource and collapse into one backlog entry.
    fn dedup_key(&self) -> String;

    /// Serialize the state needed to re-locate the resource after a restart.
    ///
    /// # Errors
    ///
    /// On failure the entry is persisted without a payload and resurfaces as
    /// an unrecoverable placeholder after a restart.
    fn encode(&self) -> anyhow::Result<serde_json::Value>;
}

/// Stand-in for an entry whose disposable could not be reconstructed from a
/// persisted snapshot.
///
/// Exposes the retained diagnostic label as its description and reports
/// [`Outcome::Purged`] on the first attempt, so the dead entry drains on the
/// next sweep instead of sticking around or crashing recovery.
pub struct Unrecoverable {
    label: String,
}

impl Unrecoverable {
    /// Kind tag reserved for placeholder entries.
    pub const KIND: &'static str = "unrecoverable";

    /// Wrap the retained diagnostic label of the lost entry.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

#[async_trait]
impl Disposable for Unrecoverable {
    async fn dispose(&self) -> anyhow::Result<Outcome> {
        Ok(Outcome::Purged)
    }

    fn display_name(&self) -> String {
        format!(
            "Unable to restore '{}'. The resource was probably leaked.",
            self.label
        )
    }

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn dedup_key(&self) -> String {
        self.label.clone()
    }

    fn encode(&self) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::json!({ "label": self.label }))
    }
}
