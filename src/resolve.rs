//! Tenant resolution: from ambient request context to a tenant record

use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use crate::error::{Error, Result};
use crate::tenant::TenantRecord;

/// Source of tenant records.
///
/// Read-mostly: the accessor looks tenants up at construction and on explicit
/// tenant switches, never on the commit hot path.
pub trait TenantStore: Send + Sync {
   /// Find a tenant by host name or tenant name. `None` when unknown.
   fn lookup(&self, host_or_name: &str) -> Option<TenantRecord>;
}

/// In-memory tenant store loaded from a configured list of records.
///
/// Records are indexed by both `name` and `host`, so a resolver can hand it
/// either side of the request context.
#[derive(Debug, Default)]
pub struct StaticTenantStore {
   records: HashMap<String, TenantRecord>,
}

impl StaticTenantStore {
   /// Build a store from tenant records, validating each.
   ///
   /// Duplicate names or hosts are a configuration error: lookups would be
   /// ambiguous.
   pub fn new(tenants: impl IntoIterator<Item = TenantRecord>) -> Result<Self> {
      let mut records = HashMap::new();

      for tenant in tenants {
         tenant.validate()?;

         let mut keys = vec![tenant.name.clone()];
         keys.extend(tenant.host.clone());

         for key in keys {
            if records.insert(key.clone(), tenant.clone()).is_some() {
               return Err(Error::Configuration(format!(
                  "duplicate tenant key '{key}'"
               )));
            }
         }
      }

      Ok(Self { records })
   }
}

impl TenantStore for StaticTenantStore {
   fn lookup(&self, host_or_name: &str) -> Option<TenantRecord> {
      self.records.get(host_or_name).cloned()
   }
}

/// Resolves the applicable tenant for an operation.
///
/// A resolver always produces a tenant: contextual lookups that miss fall
/// back to the configured default tenant, whose existence is checked at
/// construction so resolution itself cannot fail with "no tenant".
pub struct TenantResolver {
   store: Arc<dyn TenantStore>,
   default_tenant: TenantRecord,
}

impl std::fmt::Debug for TenantResolver {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("TenantResolver").finish_non_exhaustive()
   }
}

impl TenantResolver {
   /// Create a resolver with `default_tenant_name` as the fallback.
   ///
   /// Fails with [`Error::Configuration`] when the store has no record for
   /// that name.
   pub fn new(store: Arc<dyn TenantStore>, default_tenant_name: &str) -> Result<Self> {
      let default_tenant = store.lookup(default_tenant_name).ok_or_else(|| {
         Error::Configuration(format!(
            "no default tenant '{default_tenant_name}' is configured"
         ))
      })?;

      Ok(Self {
         store,
         default_tenant,
      })
   }

   /// Resolve the tenant for the given request host, falling back to the
   /// default tenant. Pure lookup; switching routing based on the result is
   /// the caller's responsibility.
   pub fn resolve(&self, host: Option<&str>) -> TenantRecord {
      if let Some(host) = host
         && let Some(tenant) = self.store.lookup(host)
      {
         trace!(host = %host, tenant = %tenant.name, "Resolved tenant from host");
         return tenant;
      }

      trace!(tenant = %self.default_tenant.name, "Falling back to default tenant");
      self.default_tenant.clone()
   }

   /// The configured fallback tenant.
   pub fn default_tenant(&self) -> &TenantRecord {
      &self.default_tenant
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use sqlx_sqlite_endpoint_mgr::ConnectionDescriptor;

   fn tenant(name: &str, host: Option<&str>) -> TenantRecord {
      let mut record = TenantRecord::single_endpoint(
         name,
         ConnectionDescriptor::new(format!("{name}.db")).unwrap(),
      );
      record.host = host.map(Into::into);
      record
   }

   #[test]
   fn test_resolves_by_host_then_falls_back() {
      let store = Arc::new(
         StaticTenantStore::new([
            tenant("fallback", None),
            tenant("acme", Some("acme.example.com")),
         ])
         .unwrap(),
      );
      let resolver = TenantResolver::new(store, "fallback").unwrap();

      assert_eq!(resolver.resolve(Some("acme.example.com")).name, "acme");
      assert_eq!(resolver.resolve(Some("unknown.example.com")).name, "fallback");
      assert_eq!(resolver.resolve(None).name, "fallback");
   }

   #[test]
   fn test_missing_default_tenant_fails_fast() {
      let store = Arc::new(StaticTenantStore::new([tenant("acme", None)]).unwrap());
      let err = TenantResolver::new(store, "nope").unwrap_err();
      assert_eq!(err.error_code(), "CONFIGURATION_ERROR");
   }

   #[test]
   fn test_duplicate_tenant_keys_are_rejected() {
      let result = StaticTenantStore::new([tenant("acme", None), tenant("acme", None)]);
      assert!(result.is_err());
   }
}
