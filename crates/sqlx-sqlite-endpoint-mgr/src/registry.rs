//! Process-wide registry of open endpoints, keyed by descriptor
//!
//! The registry holds `Weak` references: it hands out the live instance while
//! anyone is using it, but never keeps an endpoint alive on its own. Entries
//! for dropped endpoints are reaped lazily on the next lookup.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};

use tokio::sync::Mutex;
use tracing::trace;

use crate::Result;
use crate::descriptor::ConnectionDescriptor;
use crate::endpoint::SqliteEndpoint;

type Registry = Mutex<HashMap<ConnectionDescriptor, Weak<SqliteEndpoint>>>;

fn registry() -> &'static Registry {
   static REGISTRY: OnceLock<Registry> = OnceLock::new();
   REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Look up a cached endpoint or open a new one.
///
/// The registry lock is held across `open`, which serializes concurrent first
/// opens of the same descriptor: exactly one caller builds the pools, the
/// rest receive the cached `Arc`. In-memory descriptors bypass the cache
/// entirely since every in-memory connection is its own database.
pub(crate) async fn get_or_open_endpoint<F, Fut>(
   descriptor: &ConnectionDescriptor,
   open: F,
) -> Result<Arc<SqliteEndpoint>>
where
   F: FnOnce() -> Fut,
   Fut: Future<Output = Result<SqliteEndpoint>>,
{
   if descriptor.is_memory() {
      return Ok(Arc::new(open().await?));
   }

   let mut entries = registry().lock().await;

   if let Some(existing) = entries.get(descriptor).and_then(Weak::upgrade) {
      trace!(endpoint = %descriptor, "Reusing cached endpoint");
      return Ok(existing);
   }

   let endpoint = Arc::new(open().await?);
   entries.insert(descriptor.clone(), Arc::downgrade(&endpoint));

   // Opportunistically drop entries whose endpoints are gone
   entries.retain(|_, weak| weak.strong_count() > 0);

   Ok(endpoint)
}

/// Remove a descriptor from the registry (called when an endpoint closes).
pub(crate) async fn uncache_endpoint(descriptor: &ConnectionDescriptor) {
   let mut entries = registry().lock().await;
   entries.remove(descriptor);
}
