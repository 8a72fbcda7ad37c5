//! Keyed exclusive locks serializing endpoint switches
//!
//! A routing layer that rebinds a live connection between endpoints must not
//! let two switches interleave on the same shared resource. The lock table
//! here is keyed by an arbitrary string; callers use the tenant name plus
//! descriptor, i.e. the physical resource being rebound, not the accessor
//! instance doing the rebinding, so concurrent accessors contend on the
//! right thing.
//!
//! Acquisition is blocking (a queued `tokio::sync::Mutex`, not a spin) with a
//! deadline. Reentrancy is deliberately *not* supported: a caller that needs
//! to nest must avoid re-acquiring the same key, which the accessor layer
//! guarantees via its call-scoped reentry flags.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

use crate::Result;
use crate::error::Error;

type LockTable = Mutex<HashMap<String, Arc<Mutex<()>>>>;

/// A table of named exclusive locks.
///
/// One process-wide table is available via [`SwitchLocks::global`]; separate
/// instances can be created for tests that must not share lock state.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use sqlx_sqlite_endpoint_mgr::SwitchLocks;
///
/// # async fn example() -> Result<(), sqlx_sqlite_endpoint_mgr::Error> {
/// let locks = SwitchLocks::new();
/// let permit = locks
///     .acquire("acme/tenant.db", Duration::from_secs(5))
///     .await?;
/// // ... exclusive section ...
/// drop(permit);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct SwitchLocks {
   table: LockTable,
}

/// RAII permit for one key's exclusive section. Dropping it releases the key.
#[derive(Debug)]
pub struct SwitchPermit {
   key: String,
   _guard: OwnedMutexGuard<()>,
}

impl SwitchPermit {
   /// The key this permit holds.
   pub fn key(&self) -> &str {
      &self.key
   }
}

impl SwitchLocks {
   /// Create an isolated lock table.
   pub fn new() -> Self {
      Self::default()
   }

   /// The process-wide lock table shared by all accessors.
   pub fn global() -> &'static SwitchLocks {
      static GLOBAL: OnceLock<SwitchLocks> = OnceLock::new();
      GLOBAL.get_or_init(SwitchLocks::new)
   }

   /// Acquire the lock for `key`, waiting at most `timeout`.
   ///
   /// At most one permit per key exists at a time; competing acquirers queue
   /// in FIFO order. Expiry fails with [`Error::LockTimeout`] without having
   /// taken the lock.
   pub async fn acquire(&self, key: impl Into<String>, timeout: Duration) -> Result<SwitchPermit> {
      let key = key.into();

      let entry = {
         let mut table = self.table.lock().await;
         Arc::clone(
            table
               .entry(key.clone())
               .or_insert_with(|| Arc::new(Mutex::new(()))),
         )
      };

      trace!(key = %key, "Waiting for switch lock");

      match tokio::time::timeout(timeout, entry.lock_owned()).await {
         Ok(guard) => Ok(SwitchPermit { key, _guard: guard }),
         Err(_) => Err(Error::LockTimeout {
            key,
            waited_ms: timeout.as_millis() as u64,
         }),
      }
   }
}
