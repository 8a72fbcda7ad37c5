//! WriteGuard for exclusive write access to an endpoint

use sqlx::Sqlite;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::SqliteConnection;
use std::ops::{Deref, DerefMut};

use crate::descriptor::ConnectionDescriptor;

/// RAII guard for exclusive write access to one endpoint.
///
/// The guard wraps the endpoint's single write connection and returns it to
/// the pool on drop, so holding a `WriteGuard` is what serializes writers.
/// It remembers which descriptor it writes to, letting callers that juggle
/// several endpoints (a routing layer replaying a commit onto a replica, for
/// instance) assert they are writing where they think they are.
///
/// Derefs to [`SqliteConnection`] for direct use with sqlx queries:
///
/// ```no_run
/// use sqlx_sqlite_endpoint_mgr::{ConnectionDescriptor, SqliteEndpoint};
///
/// # async fn example() -> Result<(), sqlx_sqlite_endpoint_mgr::Error> {
/// let descriptor = ConnectionDescriptor::new("tenant.db")?;
/// let endpoint = SqliteEndpoint::open(&descriptor, None).await?;
/// let mut writer = endpoint.acquire_writer().await?;
/// assert_eq!(writer.descriptor(), &descriptor);
/// sqlx::query("DELETE FROM sessions")
///     .execute(&mut *writer)
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct WriteGuard {
   conn: PoolConnection<Sqlite>,
   descriptor: ConnectionDescriptor,
}

impl WriteGuard {
   pub(crate) fn new(conn: PoolConnection<Sqlite>, descriptor: ConnectionDescriptor) -> Self {
      Self { conn, descriptor }
   }

   /// The endpoint this guard writes to.
   pub fn descriptor(&self) -> &ConnectionDescriptor {
      &self.descriptor
   }
}

impl Deref for WriteGuard {
   type Target = SqliteConnection;

   fn deref(&self) -> &Self::Target {
      &*self.conn
   }
}

impl DerefMut for WriteGuard {
   fn deref_mut(&mut self) -> &mut Self::Target {
      &mut *self.conn
   }
}

// Drop returns the PoolConnection to its pool, releasing the writer slot
