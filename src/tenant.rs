//! Tenant records: per-tenant endpoint pairs and routing flags

use serde::{Deserialize, Serialize};
use sqlx_sqlite_endpoint_mgr::ConnectionDescriptor;

use crate::error::{Error, Result};
use crate::routing::EndpointRole;

/// Routing configuration for one logical tenant.
///
/// Every tenant owns a default endpoint (reads, and writes when separation is
/// off) and optionally a distinct write endpoint. The two flags control the
/// write path: `writing_separation_enabled` routes commits to the write
/// endpoint, and `data_synchronization_enabled` additionally replays each
/// committed change set onto the default endpoint.
///
/// Records are plain serde values so tenant sets load straight from JSON:
///
/// ```
/// use sqlite_tenant_accessor::TenantRecord;
///
/// let tenant: TenantRecord = serde_json::from_str(r#"{
///     "name": "acme",
///     "host": "acme.example.com",
///     "default_endpoint": "tenants/acme/default.db",
///     "write_endpoint": "tenants/acme/write.db",
///     "writing_separation_enabled": true,
///     "data_synchronization_enabled": true
/// }"#).unwrap();
/// assert!(tenant.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantRecord {
   /// Unique tenant name; doubles as the fallback lookup key.
   pub name: String,

   /// Host name requests for this tenant arrive on, if any.
   #[serde(default)]
   pub host: Option<String>,

   /// The read/default endpoint. Always present.
   pub default_endpoint: ConnectionDescriptor,

   /// The write endpoint. Absent means writes share the default endpoint.
   #[serde(default)]
   pub write_endpoint: Option<ConnectionDescriptor>,

   /// Route commits to the write endpoint instead of the default one.
   #[serde(default)]
   pub writing_separation_enabled: bool,

   /// After a separated commit succeeds, replay it onto the default endpoint.
   #[serde(default)]
   pub data_synchronization_enabled: bool,
}

impl TenantRecord {
   /// A tenant whose reads and writes share one endpoint.
   pub fn single_endpoint(name: impl Into<String>, endpoint: ConnectionDescriptor) -> Self {
      Self {
         name: name.into(),
         host: None,
         default_endpoint: endpoint,
         write_endpoint: None,
         writing_separation_enabled: false,
         data_synchronization_enabled: false,
      }
   }

   /// The descriptor serving `role` for this tenant.
   ///
   /// With no distinct write endpoint configured, both roles resolve to the
   /// default descriptor.
   pub fn descriptor_for(&self, role: EndpointRole) -> &ConnectionDescriptor {
      match role {
         EndpointRole::Default => &self.default_endpoint,
         EndpointRole::Write => self.write_endpoint.as_ref().unwrap_or(&self.default_endpoint),
      }
   }

   /// Check the record's internal consistency.
   ///
   /// Separation without a distinct write endpoint is allowed (it degrades to
   /// single-endpoint routing), but synchronization without separation is a
   /// configuration error: there is no second endpoint to replay onto.
   pub fn validate(&self) -> Result<()> {
      if self.name.trim().is_empty() {
         return Err(Error::Configuration("tenant name cannot be empty".into()));
      }

      if self.data_synchronization_enabled && !self.writing_separation_enabled {
         return Err(Error::Configuration(format!(
            "tenant '{}' enables data synchronization without writing separation",
            self.name
         )));
      }

      if self.data_synchronization_enabled
         && self.descriptor_for(EndpointRole::Write) == &self.default_endpoint
      {
         return Err(Error::Configuration(format!(
            "tenant '{}' enables data synchronization but write and default endpoints are the same",
            self.name
         )));
      }

      Ok(())
   }

   /// Whether commits for this tenant actually change endpoints.
   pub fn separates_writes(&self) -> bool {
      self.writing_separation_enabled
         && self.descriptor_for(EndpointRole::Write) != &self.default_endpoint
   }
}
