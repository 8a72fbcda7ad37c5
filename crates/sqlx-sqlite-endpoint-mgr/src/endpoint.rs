//! SQLite endpoint handle with pooled reads and exclusive writes

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{ConnectOptions, Pool, Sqlite};
use tracing::{debug, error};

use crate::Result;
use crate::config::EndpointConfig;
use crate::descriptor::ConnectionDescriptor;
use crate::error::Error;
use crate::registry::{get_or_open_endpoint, uncache_endpoint};
use crate::write_guard::WriteGuard;

/// One physical SQLite endpoint with a read-only pool and a single exclusive
/// write connection.
///
/// Reads go through `read_pool()` and can run concurrently. Writes go through
/// `acquire_writer()`, which lazily switches the endpoint into WAL mode on
/// first use and hands out an exclusive [`WriteGuard`].
///
/// Endpoints are cached process-wide by descriptor: opening the same
/// descriptor twice yields the same `Arc` instance, so a routing layer that
/// rebinds between endpoints shares pools with every other holder of the
/// descriptor. In-memory endpoints are the exception and are never cached.
///
/// # Example
///
/// ```no_run
/// use sqlx_sqlite_endpoint_mgr::{ConnectionDescriptor, SqliteEndpoint};
///
/// # async fn example() -> Result<(), sqlx_sqlite_endpoint_mgr::Error> {
/// let descriptor = ConnectionDescriptor::new("tenant.db")?;
/// let endpoint = SqliteEndpoint::open(&descriptor, None).await?;
///
/// let rows = sqlx::query("SELECT * FROM users")
///     .fetch_all(endpoint.read_pool()?)
///     .await?;
///
/// let mut writer = endpoint.acquire_writer().await?;
/// sqlx::query("INSERT INTO users (name) VALUES (?)")
///     .bind("Alice")
///     .execute(&mut *writer)
///     .await?;
/// drop(writer);
///
/// endpoint.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SqliteEndpoint {
   /// Pool of read-only connections for concurrent reads
   read_pool: Pool<Sqlite>,

   /// Single read-write connection pool (max_connections=1) for serialized writes
   write_conn: Pool<Sqlite>,

   /// Tracks if WAL mode has been initialized (set on first write)
   wal_initialized: AtomicBool,

   /// Marks the endpoint as closed to prevent further operations
   closed: AtomicBool,

   /// Descriptor this endpoint was opened from (registry identity)
   descriptor: ConnectionDescriptor,
}

impl SqliteEndpoint {
   /// Open the endpoint named by `descriptor`.
   ///
   /// The database file is created if it does not exist. Repeated opens of
   /// the same descriptor return the cached instance; pass `None` for the
   /// default pool configuration.
   pub async fn open(
      descriptor: &ConnectionDescriptor,
      custom_config: Option<EndpointConfig>,
   ) -> Result<Arc<Self>> {
      let config = custom_config.unwrap_or_default();
      let descriptor = descriptor.clone();

      get_or_open_endpoint(&descriptor, || async {
         let path = descriptor.as_path();

         // A missing file must be created with a throwaway read-write
         // connection before the read pool touches it: read-only connections
         // cannot create the file, and the very first statement issued
         // against a fresh endpoint is often a read (PRAGMA, schema probe).
         if !descriptor.is_memory() && !path.exists() {
            let create_options = SqliteConnectOptions::new()
               .filename(path)
               .create_if_missing(true)
               .read_only(false);

            let conn = create_options.connect().await?;
            drop(conn);
            debug!(endpoint = %descriptor, "Created database file for new endpoint");
         }

         let read_options = SqliteConnectOptions::new().filename(path).read_only(true);

         let read_pool = SqlitePoolOptions::new()
            .max_connections(config.max_read_connections)
            .min_connections(0)
            .idle_timeout(Some(std::time::Duration::from_secs(
               config.idle_timeout_secs,
            )))
            .connect_with(read_options)
            .await?;

         let write_options = SqliteConnectOptions::new().filename(path).read_only(false);

         let write_conn = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(0)
            .idle_timeout(Some(std::time::Duration::from_secs(
               config.idle_timeout_secs,
            )))
            .connect_with(write_options)
            .await?;

         Ok(Self {
            read_pool,
            write_conn,
            wal_initialized: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            descriptor: descriptor.clone(),
         })
      })
      .await
   }

   /// The descriptor this endpoint was opened from.
   pub fn descriptor(&self) -> &ConnectionDescriptor {
      &self.descriptor
   }

   /// Get a reference to the connection pool for executing read queries.
   ///
   /// Multiple readers can use the pool simultaneously. Fails with
   /// [`Error::EndpointClosed`] once the endpoint is closed.
   pub fn read_pool(&self) -> Result<&Pool<Sqlite>> {
      if self.closed.load(Ordering::SeqCst) {
         return Err(Error::EndpointClosed);
      }
      Ok(&self.read_pool)
   }

   /// Acquire exclusive write access to the endpoint.
   ///
   /// Only one writer exists at a time (enforced by the single-connection
   /// write pool). The first acquisition switches the database into WAL mode
   /// with `synchronous = NORMAL`; subsequent calls reuse the connection.
   pub async fn acquire_writer(&self) -> Result<WriteGuard> {
      if self.closed.load(Ordering::SeqCst) {
         return Err(Error::EndpointClosed);
      }

      let mut conn = self.write_conn.acquire().await?;

      // Idempotent, but skipping the round-trips after the first writer
      // keeps the hot path to a single pool acquire.
      if !self.wal_initialized.load(Ordering::SeqCst) {
         sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&mut *conn)
            .await?;

         // https://www.sqlite.org/wal.html#performance_considerations
         sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&mut *conn)
            .await?;

         self.wal_initialized.store(true, Ordering::SeqCst);
      }

      Ok(WriteGuard::new(conn, self.descriptor.clone()))
   }

   /// Close the endpoint and release its pools.
   ///
   /// Drains the read pool, checkpoints the WAL (when a writer was ever
   /// acquired) so the sidecar files are truncated, and drops the registry
   /// entry. Later operations fail with [`Error::EndpointClosed`].
   pub async fn close(self: Arc<Self>) -> Result<()> {
      self.closed.store(true, Ordering::SeqCst);

      uncache_endpoint(&self.descriptor).await;

      // Awaits all outstanding readers before returning their connections
      self.read_pool.close().await;

      if self.wal_initialized.load(Ordering::SeqCst)
         && let Ok(mut conn) = self.write_conn.acquire().await
      {
         if let Err(e) = sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&mut *conn)
            .await
         {
            error!(endpoint = %self.descriptor, "WAL checkpoint on close failed: {e}");
         }
      }

      self.write_conn.close().await;

      Ok(())
   }

   /// Close the endpoint and delete its files (database, WAL, SHM).
   ///
   /// Intended for decommissioning an endpoint; in-memory endpoints only
   /// close. Use with caution.
   pub async fn remove(self: Arc<Self>) -> Result<()> {
      let descriptor = self.descriptor.clone();

      self.close().await?;

      if descriptor.is_memory() {
         return Ok(());
      }

      std::fs::remove_file(descriptor.as_path()).map_err(Error::Io)?;

      // Sidecar files may not exist if WAL was never initialized
      for sidecar in [descriptor.wal_path(), descriptor.shm_path()] {
         if let Err(e) = std::fs::remove_file(&sidecar)
            && e.kind() != std::io::ErrorKind::NotFound
         {
            return Err(Error::Io(e));
         }
      }

      Ok(())
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   fn temp_descriptor(dir: &tempfile::TempDir, name: &str) -> ConnectionDescriptor {
      ConnectionDescriptor::new(dir.path().join(name).to_string_lossy().into_owned()).unwrap()
   }

   #[tokio::test]
   async fn test_open_creates_missing_file() {
      let dir = tempfile::TempDir::new().unwrap();
      let descriptor = temp_descriptor(&dir, "fresh.db");
      assert!(!descriptor.as_path().exists());

      let endpoint = SqliteEndpoint::open(&descriptor, None).await.unwrap();
      assert!(descriptor.as_path().exists());

      // The first statement against a fresh endpoint can be a read
      let (n,): (i64,) = sqlx::query_as("SELECT 1")
         .fetch_one(endpoint.read_pool().unwrap())
         .await
         .unwrap();
      assert_eq!(n, 1);

      endpoint.close().await.unwrap();
   }

   #[tokio::test]
   async fn test_closed_endpoint_rejects_operations() {
      let dir = tempfile::TempDir::new().unwrap();
      let descriptor = temp_descriptor(&dir, "closed.db");

      let endpoint = SqliteEndpoint::open(&descriptor, None).await.unwrap();
      let held = Arc::clone(&endpoint);
      endpoint.close().await.unwrap();

      assert!(matches!(
         held.read_pool().unwrap_err(),
         Error::EndpointClosed
      ));
      assert!(matches!(
         held.acquire_writer().await.unwrap_err(),
         Error::EndpointClosed
      ));
   }

   #[tokio::test]
   async fn test_same_descriptor_returns_cached_instance() {
      let dir = tempfile::TempDir::new().unwrap();
      let descriptor = temp_descriptor(&dir, "cached.db");

      let a = SqliteEndpoint::open(&descriptor, None).await.unwrap();
      let b = SqliteEndpoint::open(&descriptor, None).await.unwrap();
      assert!(Arc::ptr_eq(&a, &b), "same descriptor should share instance");

      drop(a);
      b.remove().await.unwrap();
      assert!(!descriptor.as_path().exists());
   }

   #[tokio::test]
   async fn test_memory_endpoints_are_independent() {
      let descriptor = ConnectionDescriptor::new(":memory:").unwrap();

      let a = SqliteEndpoint::open(&descriptor, None).await.unwrap();
      let b = SqliteEndpoint::open(&descriptor, None).await.unwrap();
      assert!(
         !Arc::ptr_eq(&a, &b),
         ":memory: endpoints must not be cached"
      );

      let mut writer = a.acquire_writer().await.unwrap();
      sqlx::query("CREATE TABLE t (id INTEGER)")
         .execute(&mut *writer)
         .await
         .unwrap();
      drop(writer);

      // b is a different database and must not see a's table
      let mut writer_b = b.acquire_writer().await.unwrap();
      let result = sqlx::query("SELECT * FROM t")
         .fetch_optional(&mut *writer_b)
         .await;
      assert!(result.is_err());
   }

   #[tokio::test]
   async fn test_wal_enabled_on_first_writer() {
      let dir = tempfile::TempDir::new().unwrap();
      let descriptor = temp_descriptor(&dir, "wal.db");

      let endpoint = SqliteEndpoint::open(&descriptor, None).await.unwrap();
      let mut writer = endpoint.acquire_writer().await.unwrap();

      let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
         .fetch_one(&mut *writer)
         .await
         .unwrap();
      assert_eq!(mode.to_lowercase(), "wal");

      drop(writer);
      endpoint.remove().await.unwrap();
   }
}
