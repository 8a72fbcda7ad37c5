//! Configuration for endpoint connection pools

use serde::{Deserialize, Serialize};

/// Pool settings applied to every endpoint opened with them.
///
/// # Examples
///
/// ```
/// use sqlx_sqlite_endpoint_mgr::EndpointConfig;
///
/// // Use defaults
/// let config = EndpointConfig::default();
///
/// // Builder-style overrides
/// let config = EndpointConfig::default()
///     .with_max_read_connections(3)
///     .with_idle_timeout_secs(60);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
   /// Maximum number of concurrent read connections
   ///
   /// This controls the size of the read-only connection pool.
   /// Higher values allow more concurrent read queries but consume more resources.
   ///
   /// Default: 6
   pub max_read_connections: u32,

   /// Idle timeout for both read and write connections (in seconds)
   ///
   /// Connections that remain idle for this duration will be closed automatically.
   /// This helps prevent resource exhaustion from idle threads.
   ///
   /// Default: 30
   pub idle_timeout_secs: u64,
}

impl Default for EndpointConfig {
   fn default() -> Self {
      Self {
         max_read_connections: 6,
         idle_timeout_secs: 30,
      }
   }
}

impl EndpointConfig {
   /// Sets the size of the read-only connection pool.
   pub fn with_max_read_connections(mut self, max: u32) -> Self {
      self.max_read_connections = max;
      self
   }

   /// Sets the idle timeout for pooled connections.
   pub fn with_idle_timeout_secs(mut self, secs: u64) -> Self {
      self.idle_timeout_secs = secs;
      self
   }
}
