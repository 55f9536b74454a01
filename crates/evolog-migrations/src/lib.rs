//! # evolog-migrations
//!
//! The migration engine of the evolog datastore. When the event schema
//! evolves, historic events must be rewritten so that replay under the new
//! schema yields the intended models; this crate drives that rewrite.
//!
//! - **[`Migration`]**: the contract a migration step satisfies — a target
//!   index plus a per-event or full-position rewriter
//! - **[`KeyframeAccessor`]**: the synchronized model-world views (old and
//!   new schema) presented to every step
//! - **Position migrator**: walks the log position by position, running the
//!   step chain and diff-writing rewritten events into staging
//! - **[`Finalizer`]**: swaps staged events into the live log and rebuilds
//!   the derived models table
//! - **[`MigrationHandler`]**: the orchestrating entry point — decides
//!   whether migration or finalization is needed and drives both
//!
//! The engine is single-threaded and restartable: each position commits in
//! its own transaction, so an interrupted run resumes at the first position
//! that still needs work.

#![deny(unsafe_code)]

pub mod errors;
pub mod finalize;
pub mod handler;
pub mod keyframes;
mod migrater;
pub mod migration;

pub use errors::{MigrationError, Result};
pub use finalize::Finalizer;
pub use handler::{MigrationHandler, MigrationStats};
pub use keyframes::{DatabaseKeyframeAccessor, InitialKeyframeAccessor, KeyframeAccessor};
pub use migration::{Migration, MigrationContext, PositionData, RenameFieldMigration};
