//! # Resource Disposer
//!
//! A durable, deduplicating retry engine for asynchronous disposal of
//! external resources.
//!
//! Independent producers register an external resource (a virtual machine, a
//! remote-system record, a temporary file, anything outside direct program
//! control) for guaranteed eventual deletion. A registered resource is
//! retried on a fixed cadence until deletion succeeds or an operator
//! manually abandons it, and registrations are persisted so a crash or
//! redeploy cannot silently lose track of something that still needs
//! cleanup.
//!
//! ## Guarantees
//!
//! - **Deduplication**: equal disposables collapse into one backlog entry;
//!   re-registration after a restart is idempotent.
//! - **Per-item exclusion**: a resource is never disposed concurrently with
//!   itself.
//! - **Bounded concurrency**: a fixed ceiling of attempts across the whole
//!   backlog; a stuck attempt wastes one slot, never the engine.
//! - **Safe recovery**: a partially-corrupt persisted entry never crashes
//!   recovery; it resurfaces as a placeholder that drains on the next sweep.
//! - **Containment**: producer errors and panics are caught at the
//!   dispatcher boundary, retained for reporting, and never escalate.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use resource_disposer::config::DisposerConfig;
//! use resource_disposer::core::Disposer;
//! use resource_disposer::infra::{DisposableRegistry, JsonFileStore};
//! use resource_disposer::runtime::TokioSpawner;
//!
//! let store = Arc::new(JsonFileStore::new("/var/lib/myapp/disposer.json")?);
//! let mut registry = DisposableRegistry::new();
//! registry.register("vm", |payload| Ok(Arc::new(VmDisposable::decode(payload)?) as _));
//!
//! let disposer = Disposer::start(
//!     DisposerConfig::default(),
//!     store,
//!     registry,
//!     TokioSpawner::current(),
//! )?;
//!
//! disposer.dispose([Arc::new(VmDisposable::new("build-agent-7")) as _]);
//! ```

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core disposal engine: capability trait, backlog, dispatcher, scheduler.
pub mod core;
/// Configuration models for the disposer engine.
pub mod config;
/// Infrastructure adapters: snapshot stores and the decode registry.
pub mod infra;
/// Runtime adapters for spawning attempt execution.
pub mod runtime;
/// Shared utilities.
pub mod util;
