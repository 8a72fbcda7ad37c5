//! Accessor configuration

use serde::{Deserialize, Serialize};
use sqlx_sqlite_endpoint_mgr::EndpointConfig;
use std::time::Duration;

/// Deadlines and pool settings for one accessor.
///
/// # Examples
///
/// ```
/// use sqlite_tenant_accessor::AccessorConfig;
///
/// let config = AccessorConfig::default()
///     .with_switch_timeout_secs(5)
///     .with_replay_deadline_secs(10);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessorConfig {
   /// How long a routing switch may wait for the switch lock (in seconds)
   ///
   /// Expiry surfaces a lock-timeout error; the caller may retry.
   ///
   /// Default: 30
   pub switch_timeout_secs: u64,

   /// Deadline for replaying a committed change set onto the default
   /// endpoint (in seconds)
   ///
   /// Expiry after the write phase surfaces a partial-synchronization error
   /// carrying the change-set identity for manual replay.
   ///
   /// Default: 30
   pub replay_deadline_secs: u64,

   /// Pool settings applied to every endpoint this accessor opens
   #[serde(default)]
   pub endpoint: EndpointConfig,
}

impl Default for AccessorConfig {
   fn default() -> Self {
      Self {
         switch_timeout_secs: 30,
         replay_deadline_secs: 30,
         endpoint: EndpointConfig::default(),
      }
   }
}

impl AccessorConfig {
   /// Sets the switch-lock acquisition timeout.
   pub fn with_switch_timeout_secs(mut self, secs: u64) -> Self {
      self.switch_timeout_secs = secs;
      self
   }

   /// Sets the replay deadline.
   pub fn with_replay_deadline_secs(mut self, secs: u64) -> Self {
      self.replay_deadline_secs = secs;
      self
   }

   /// Sets the endpoint pool configuration.
   pub fn with_endpoint(mut self, endpoint: EndpointConfig) -> Self {
      self.endpoint = endpoint;
      self
   }

   pub(crate) fn switch_timeout(&self) -> Duration {
      Duration::from_secs(self.switch_timeout_secs)
   }

   pub(crate) fn replay_deadline(&self) -> Duration {
      Duration::from_secs(self.replay_deadline_secs)
   }
}
