//! Error types for sqlx-sqlite-endpoint-mgr

use thiserror::Error;

/// Errors that may occur when working with sqlx-sqlite-endpoint-mgr
#[derive(Error, Debug)]
pub enum Error {
   /// IO error when accessing database files. Standard library IO errors
   /// are converted to this variant.
   #[error("IO error: {0}")]
   Io(#[from] std::io::Error),

   /// Error from the sqlx library. Standard sqlx errors are converted to this variant
   #[error("Sqlx error: {0}")]
   Sqlx(#[from] sqlx::Error),

   /// Migration error from the sqlx migrate framework
   #[error("Migration error: {0}")]
   Migration(#[from] sqlx::migrate::MigrateError),

   /// Endpoint has been closed and cannot be used
   #[error("Endpoint has been closed")]
   EndpointClosed,

   /// A connection descriptor must name an endpoint; empty strings are rejected
   #[error("Connection descriptor cannot be empty")]
   EmptyDescriptor,

   /// A switch lock could not be acquired before the deadline expired
   #[error("Timed out after {waited_ms}ms waiting for exclusive access to '{key}'")]
   LockTimeout { key: String, waited_ms: u64 },
}
