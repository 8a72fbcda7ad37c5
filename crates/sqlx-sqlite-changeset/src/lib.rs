//! # sqlx-sqlite-changeset
//!
//! Replayable change sets for SQLite write routing.
//!
//! A routing layer that commits against a write endpoint and then replays the
//! same commit onto a read replica needs a snapshot of the pending operations
//! taken *before* the first execution: executing mutates entity lifecycle
//! state (pending → committed) and assigns server-generated keys, either of
//! which would corrupt a second pass derived from the live session.
//!
//! ## Core Types
//!
//! - **[`ChangeOperation`]** / **[`ColumnValue`]**: operation kinds and typed column values
//! - **[`EntityKey`]** / **[`EntityState`]**: identifier strategies and lifecycle states
//! - **[`EntityHandle`]**: shared handle whose lifecycle the engine mutates and replay rewinds
//! - **[`PendingOp`]**: one staged row operation
//! - **[`ChangeSet`]**: the captured, at-most-twice-consumed snapshot
//!
//! ## Capture / replay contract
//!
//! [`ChangeSet::capture`] clones values and records each entity's
//! pre-execution state. [`ChangeSet::reset_for_replay`] rewinds the entities
//! and clears server-generated keys; it succeeds exactly once. Replay then
//! re-executes the captured operations verbatim; the live session is never
//! consulted again.

mod change;
mod entity;
mod error;
mod set;

pub use change::{ChangeOperation, ColumnValue, EntityKey, EntityState};
pub use entity::EntityHandle;
pub use error::Error;
pub use set::{CapturedOp, ChangeSet, PendingOp};

/// A type alias for Results with our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
