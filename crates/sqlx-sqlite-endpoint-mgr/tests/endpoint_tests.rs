use std::sync::Arc;
use std::time::Duration;

use sqlx_sqlite_endpoint_mgr::{
   ConnectionDescriptor, EndpointConfig, SqliteEndpoint, SwitchLocks,
};
use tempfile::TempDir;

fn descriptor_in(dir: &TempDir, name: &str) -> ConnectionDescriptor {
   ConnectionDescriptor::new(dir.path().join(name).to_string_lossy().into_owned()).unwrap()
}

#[tokio::test]
async fn test_concurrent_reads_share_the_pool() {
   use std::sync::atomic::{AtomicUsize, Ordering};
   use tokio::sync::Barrier;

   let dir = TempDir::new().unwrap();
   let descriptor = descriptor_in(&dir, "reads.db");
   let endpoint = SqliteEndpoint::open(&descriptor, None).await.unwrap();

   let mut writer = endpoint.acquire_writer().await.unwrap();
   sqlx::query("CREATE TABLE numbers (n INTEGER)")
      .execute(&mut *writer)
      .await
      .unwrap();
   for n in 0..12 {
      sqlx::query("INSERT INTO numbers (n) VALUES (?)")
         .bind(n)
         .execute(&mut *writer)
         .await
         .unwrap();
   }
   drop(writer);

   let barrier = Arc::new(Barrier::new(3));
   let (active, max_seen) = (Arc::new(AtomicUsize::new(0)), Arc::new(AtomicUsize::new(0)));

   let handles: Vec<_> = (0..3)
      .map(|_| {
         let (endpoint, barrier, active, max_seen) = (
            Arc::clone(&endpoint),
            Arc::clone(&barrier),
            Arc::clone(&active),
            Arc::clone(&max_seen),
         );

         tokio::spawn(async move {
            barrier.wait().await;
            max_seen.fetch_max(active.fetch_add(1, Ordering::SeqCst) + 1, Ordering::SeqCst);

            tokio::time::sleep(Duration::from_millis(10)).await;
            let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM numbers")
               .fetch_one(endpoint.read_pool().unwrap())
               .await
               .unwrap();

            assert_eq!(count, 12);

            active.fetch_sub(1, Ordering::SeqCst);
         })
      })
      .collect();

   for handle in handles {
      handle.await.unwrap();
   }

   assert_eq!(
      max_seen.load(Ordering::SeqCst),
      3,
      "Expected 3 concurrent reads, but only {} were active simultaneously",
      max_seen.load(Ordering::SeqCst)
   );

   endpoint.remove().await.unwrap();
}

#[tokio::test]
async fn test_writers_are_serialized() {
   let dir = TempDir::new().unwrap();
   let descriptor = descriptor_in(&dir, "writes.db");
   let endpoint = SqliteEndpoint::open(&descriptor, None).await.unwrap();

   let mut writer = endpoint.acquire_writer().await.unwrap();
   sqlx::query("CREATE TABLE counter (id INTEGER PRIMARY KEY, value INTEGER)")
      .execute(&mut *writer)
      .await
      .unwrap();
   sqlx::query("INSERT INTO counter (id, value) VALUES (1, 0)")
      .execute(&mut *writer)
      .await
      .unwrap();
   drop(writer);

   let handles: Vec<_> = (0..3)
      .map(|_| {
         let endpoint = Arc::clone(&endpoint);
         tokio::spawn(async move {
            let mut writer = endpoint.acquire_writer().await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            sqlx::query("UPDATE counter SET value = value + 1 WHERE id = 1")
               .execute(&mut *writer)
               .await
               .unwrap();
         })
      })
      .collect();

   for handle in handles {
      handle.await.unwrap();
   }

   let (value,): (i64,) = sqlx::query_as("SELECT value FROM counter WHERE id = 1")
      .fetch_one(endpoint.read_pool().unwrap())
      .await
      .unwrap();
   assert_eq!(value, 3, "all three writes must land");

   endpoint.remove().await.unwrap();
}

#[tokio::test]
async fn test_two_endpoints_are_independent_databases() {
   let dir = TempDir::new().unwrap();
   let d1 = descriptor_in(&dir, "one.db");
   let d2 = descriptor_in(&dir, "two.db");

   let first = SqliteEndpoint::open(&d1, None).await.unwrap();
   let second = SqliteEndpoint::open(&d2, None).await.unwrap();
   assert!(!Arc::ptr_eq(&first, &second));

   let mut writer = first.acquire_writer().await.unwrap();
   sqlx::query("CREATE TABLE only_here (id INTEGER)")
      .execute(&mut *writer)
      .await
      .unwrap();
   drop(writer);

   let probe = sqlx::query("SELECT * FROM only_here")
      .fetch_optional(second.read_pool().unwrap())
      .await;
   assert!(probe.is_err(), "table must not exist on the other endpoint");

   first.remove().await.unwrap();
   second.remove().await.unwrap();
}

#[tokio::test]
async fn test_custom_config_is_accepted() {
   let dir = TempDir::new().unwrap();
   let descriptor = descriptor_in(&dir, "config.db");

   let config = EndpointConfig::default()
      .with_max_read_connections(10)
      .with_idle_timeout_secs(60);

   let endpoint = SqliteEndpoint::open(&descriptor, Some(config)).await.unwrap();
   endpoint.remove().await.unwrap();
}

#[tokio::test]
async fn test_switch_lock_serializes_switches_between_endpoints() {
   // Two tasks rebinding the same shared resource: the second must observe
   // the first's completed switch, never an interleaved one.
   let locks = Arc::new(SwitchLocks::new());
   let journal = Arc::new(tokio::sync::Mutex::new(Vec::<String>::new()));

   let handles: Vec<_> = ["w1", "d1"]
      .into_iter()
      .map(|target| {
         let locks = Arc::clone(&locks);
         let journal = Arc::clone(&journal);
         tokio::spawn(async move {
            let _permit = locks
               .acquire("acme/shared", Duration::from_secs(5))
               .await
               .unwrap();
            journal.lock().await.push(format!("begin {target}"));
            tokio::time::sleep(Duration::from_millis(10)).await;
            journal.lock().await.push(format!("end {target}"));
         })
      })
      .collect();

   for handle in handles {
      handle.await.unwrap();
   }

   let journal = journal.lock().await;
   assert_eq!(journal.len(), 4);
   // Whichever began first must end before the other begins
   assert_eq!(journal[0].replace("begin ", "end "), journal[1]);
}
