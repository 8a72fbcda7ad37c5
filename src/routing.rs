//! Live routing state of one accessor

use std::sync::Arc;

use sqlx_sqlite_endpoint_mgr::{ConnectionDescriptor, SqliteEndpoint};

use crate::tenant::TenantRecord;

/// Which of a tenant's two endpoints an operation should target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointRole {
   /// The read/default endpoint.
   Default,
   /// The write endpoint (equal to the default when separation is off).
   Write,
}

/// The accessor's current binding: which tenant, which of its endpoints, and
/// the live endpoint handle.
///
/// Routing state is an explicit value owned by one mutex and swapped as a
/// whole under the switch lock, never mutated field-by-field from several
/// methods, so a holder of the mutex always observes a consistent
/// tenant/descriptor/handle triple. The descriptor always equals one of the
/// current tenant's two descriptors.
#[derive(Debug)]
pub(crate) struct RoutingState {
   pub(crate) tenant: TenantRecord,
   pub(crate) role: EndpointRole,
   pub(crate) endpoint: Option<Arc<SqliteEndpoint>>,
}

impl RoutingState {
   /// Bind to `tenant`'s default endpoint, handle not yet opened.
   pub(crate) fn bind(tenant: TenantRecord) -> Self {
      Self {
         tenant,
         role: EndpointRole::Default,
         endpoint: None,
      }
   }

   /// The descriptor currently routed to.
   pub(crate) fn descriptor(&self) -> &ConnectionDescriptor {
      self.tenant.descriptor_for(self.role)
   }

   /// Snapshot of (tenant name, role) for restoring after a detour.
   pub(crate) fn snapshot(&self) -> (String, EndpointRole) {
      (self.tenant.name.clone(), self.role)
   }
}
