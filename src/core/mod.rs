//! Core disposal engine: capability trait, backlog, dispatcher, scheduler.

pub mod backlog;
pub mod disposable;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod work_item;

pub use backlog::Backlog;
pub use disposable::{Disposable, Outcome, Unrecoverable};
pub use dispatcher::{Dispatcher, Spawn};
pub use engine::{BacklogReport, Disposer, DisposerStats};
pub use error::{AppResult, DisposerError};
pub use work_item::WorkItem;
