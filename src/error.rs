/// Result type alias for accessor operations.
pub type Result<T> = std::result::Result<T, Error>;

use uuid::Uuid;

/// Error types for tenant-routed accessor operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// Invalid or incomplete routing configuration (missing default tenant,
   /// separation enabled without a write endpoint). Fails fast at
   /// construction; never retryable.
   #[error("configuration error: {0}")]
   Configuration(String),

   /// Error from the endpoint manager. Lock timeouts surface through here
   /// and are retryable by the caller.
   #[error(transparent)]
   Endpoint(#[from] sqlx_sqlite_endpoint_mgr::Error),

   /// Error from change-set capture or replay.
   #[error(transparent)]
   ChangeSet(#[from] sqlx_sqlite_changeset::Error),

   /// Structural schema failure (cannot create schema, cannot apply
   /// revisions). Fatal for that endpoint.
   #[error("migration failed for endpoint '{endpoint}': {source}")]
   MigrationFailed {
      endpoint: String,
      #[source]
      source: Box<Error>,
   },

   /// A read observed the routing state mid-switch. Retryable.
   #[error("routing change in progress, retry the operation")]
   RoutingInFlux,

   /// The write endpoint committed but the replay onto the default endpoint
   /// did not complete. Carries what an operator needs to replay manually;
   /// never silently dropped.
   #[error(
      "write committed on tenant '{tenant}' but synchronization of change set {change_set_id} did not complete: {source}"
   )]
   PartialSynchronization {
      tenant: String,
      change_set_id: Uuid,
      #[source]
      source: Box<Error>,
   },

   /// A blocking step exceeded its configured deadline.
   #[error("deadline of {secs}s exceeded while {what}")]
   DeadlineExceeded { what: &'static str, secs: u64 },

   /// The underlying execution of a commit failed. Propagated unchanged.
   #[error("commit failed: {0}")]
   CommitFailed(#[source] sqlx::Error),
}

impl Error {
   /// Extract a structured error code from the error type.
   ///
   /// This provides machine-readable error codes for error handling.
   pub fn error_code(&self) -> String {
      use sqlx_sqlite_endpoint_mgr::Error as EndpointError;

      match self {
         Error::Configuration(_) => "CONFIGURATION_ERROR".to_string(),
         Error::Endpoint(EndpointError::LockTimeout { .. }) => "LOCK_TIMEOUT".to_string(),
         Error::Endpoint(_) => "ENDPOINT_ERROR".to_string(),
         Error::ChangeSet(_) => "CHANGESET_ERROR".to_string(),
         Error::MigrationFailed { .. } => "MIGRATION_FAILED".to_string(),
         Error::RoutingInFlux => "ROUTING_IN_FLUX".to_string(),
         Error::PartialSynchronization { .. } => "PARTIAL_SYNCHRONIZATION".to_string(),
         Error::DeadlineExceeded { .. } => "DEADLINE_EXCEEDED".to_string(),
         Error::CommitFailed(_) => "COMMIT_FAILED".to_string(),
      }
   }

   /// Whether a caller can reasonably retry the failed operation as-is.
   pub fn is_retryable(&self) -> bool {
      matches!(
         self,
         Error::RoutingInFlux | Error::Endpoint(sqlx_sqlite_endpoint_mgr::Error::LockTimeout { .. })
      )
   }
}
