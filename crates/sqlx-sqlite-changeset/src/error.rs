//! Error types for sqlx-sqlite-changeset

use thiserror::Error;
use uuid::Uuid;

/// Errors that may occur when capturing or replaying a change set
#[derive(Error, Debug)]
pub enum Error {
   /// An update or delete was staged against an entity with no assigned key
   #[error("Cannot capture {operation} on '{table}': entity key is not assigned")]
   UnkeyedOperation {
      operation: &'static str,
      table: String,
   },

   /// A change set may be replayed at most once after its first execution
   #[error("Change set {0} has already been replayed")]
   AlreadyReplayed(Uuid),
}
