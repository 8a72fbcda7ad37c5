//! End-to-end write separation against real SQLite files: commit on the
//! write endpoint, replay onto the default endpoint, verify both databases.

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use sqlite_tenant_accessor::{
   Accessor, ColumnValue, ConnectionDescriptor, EntityKey, Result, SchemaMigrator, SeedRow,
   SqliteEndpoint, StaticSeeder, StaticTenantStore, TenantRecord,
};
use tempfile::TempDir;

fn descriptor_in(dir: &TempDir, name: &str) -> ConnectionDescriptor {
   ConnectionDescriptor::new(dir.path().join(name).to_string_lossy().into_owned()).unwrap()
}

fn values(pairs: &[(&str, ColumnValue)]) -> IndexMap<String, ColumnValue> {
   pairs
      .iter()
      .map(|(k, v)| (k.to_string(), v.clone()))
      .collect()
}

/// Migrator creating the test schema on any endpoint it touches.
struct TableMigrator;

#[async_trait]
impl SchemaMigrator for TableMigrator {
   async fn ensure_schema(&self, descriptor: &ConnectionDescriptor) -> Result<bool> {
      Ok(!descriptor.as_path().exists())
   }

   async fn apply_pending_revisions(&self, descriptor: &ConnectionDescriptor) -> Result<u64> {
      let endpoint = SqliteEndpoint::open(descriptor, None).await?;
      let mut writer = endpoint.acquire_writer().await?;

      sqlx::query(
         "CREATE TABLE IF NOT EXISTS users (id INTEGER PRIMARY KEY, name TEXT, age INTEGER)",
      )
      .execute(&mut *writer)
      .await
      .map_err(sqlx_sqlite_endpoint_mgr::Error::Sqlx)?;

      sqlx::query("CREATE TABLE IF NOT EXISTS tenants (id TEXT PRIMARY KEY, host TEXT)")
         .execute(&mut *writer)
         .await
         .map_err(sqlx_sqlite_endpoint_mgr::Error::Sqlx)?;

      Ok(1)
   }
}

fn synchronized_accessor(dir: &TempDir) -> (Accessor, TenantRecord) {
   let tenant = TenantRecord {
      name: "acme".into(),
      host: Some("acme.example.com".into()),
      default_endpoint: descriptor_in(dir, "d1.db"),
      write_endpoint: Some(descriptor_in(dir, "w1.db")),
      writing_separation_enabled: true,
      data_synchronization_enabled: true,
   };

   let store = StaticTenantStore::new([tenant.clone()]).unwrap();
   let accessor = Accessor::builder()
      .with_tenant_store(Arc::new(store))
      .with_default_tenant("acme")
      .with_migrator(Arc::new(TableMigrator))
      .build()
      .unwrap();

   (accessor, tenant)
}

async fn fetch_users(descriptor: &ConnectionDescriptor) -> Vec<(i64, String, i64)> {
   let endpoint = SqliteEndpoint::open(descriptor, None).await.unwrap();
   sqlx::query_as("SELECT id, name, age FROM users ORDER BY id")
      .fetch_all(endpoint.read_pool().unwrap())
      .await
      .unwrap()
}

#[tokio::test]
async fn test_synchronized_insert_lands_identically_on_both_endpoints() {
   let dir = TempDir::new().unwrap();
   let (accessor, tenant) = synchronized_accessor(&dir);

   accessor
      .stage_insert(
         "users",
         EntityKey::pending_sequential(),
         values(&[
            ("name", ColumnValue::Text("Alice".into())),
            ("age", ColumnValue::Integer(30)),
         ]),
      )
      .await;

   let rows = accessor.commit().await.unwrap();
   assert_eq!(rows, 1);

   let on_write = fetch_users(tenant.descriptor_for(
      sqlite_tenant_accessor::EndpointRole::Write,
   ))
   .await;
   let on_default = fetch_users(&tenant.default_endpoint).await;

   // Same generated key, same values, on both endpoints
   assert_eq!(on_write, on_default);
   assert_eq!(on_write.len(), 1);
   assert_eq!(on_write[0].1, "Alice");
   assert_eq!(on_write[0].2, 30);

   // Routing ends back at the default endpoint
   assert_eq!(
      accessor.current_descriptor().unwrap(),
      tenant.default_endpoint
   );
}

#[tokio::test]
async fn test_multi_operation_commit_replays_in_order() {
   let dir = TempDir::new().unwrap();
   let (accessor, tenant) = synchronized_accessor(&dir);

   let alice = accessor
      .stage_insert(
         "users",
         EntityKey::pending_sequential(),
         values(&[
            ("name", ColumnValue::Text("Alice".into())),
            ("age", ColumnValue::Integer(30)),
         ]),
      )
      .await;
   accessor
      .stage_insert(
         "users",
         EntityKey::pending_sequential(),
         values(&[
            ("name", ColumnValue::Text("Bob".into())),
            ("age", ColumnValue::Integer(25)),
         ]),
      )
      .await;
   accessor
      .stage_update(&alice, values(&[("age", ColumnValue::Integer(31))]))
      .await;

   accessor.commit().await.unwrap();

   let on_default = fetch_users(&tenant.default_endpoint).await;
   assert_eq!(on_default.len(), 2);
   assert_eq!(on_default[0].1, "Alice");
   assert_eq!(on_default[0].2, 31, "the update must follow the insert on replay too");
   assert_eq!(on_default[1].1, "Bob");

   let on_write = fetch_users(
      tenant.descriptor_for(sqlite_tenant_accessor::EndpointRole::Write),
   )
   .await;
   assert_eq!(on_write, on_default);
}

#[tokio::test]
async fn test_consecutive_commits_stay_in_sync() {
   let dir = TempDir::new().unwrap();
   let (accessor, tenant) = synchronized_accessor(&dir);

   let alice = accessor
      .stage_insert(
         "users",
         EntityKey::pending_sequential(),
         values(&[
            ("name", ColumnValue::Text("Alice".into())),
            ("age", ColumnValue::Integer(30)),
         ]),
      )
      .await;
   accessor.commit().await.unwrap();

   accessor.stage_delete(&alice).await;
   accessor
      .stage_insert(
         "users",
         EntityKey::pending_sequential(),
         values(&[
            ("name", ColumnValue::Text("Carol".into())),
            ("age", ColumnValue::Integer(41)),
         ]),
      )
      .await;
   accessor.commit().await.unwrap();

   let on_default = fetch_users(&tenant.default_endpoint).await;
   let on_write = fetch_users(
      tenant.descriptor_for(sqlite_tenant_accessor::EndpointRole::Write),
   )
   .await;

   assert_eq!(on_default, on_write);
   assert_eq!(on_default.len(), 1);
   assert_eq!(on_default[0].1, "Carol");
}

#[tokio::test]
async fn test_bootstrap_rows_seed_every_new_endpoint() {
   let dir = TempDir::new().unwrap();
   let tenant = TenantRecord {
      name: "acme".into(),
      host: Some("acme.example.com".into()),
      default_endpoint: descriptor_in(&dir, "d1.db"),
      write_endpoint: Some(descriptor_in(&dir, "w1.db")),
      writing_separation_enabled: true,
      data_synchronization_enabled: true,
   };

   let seeder = StaticSeeder::new(vec![SeedRow {
      table: "tenants".into(),
      key: EntityKey::Text("acme".into()),
      values: values(&[("host", ColumnValue::Text("acme.example.com".into()))]),
   }]);

   let store = StaticTenantStore::new([tenant.clone()]).unwrap();
   let accessor = Accessor::builder()
      .with_tenant_store(Arc::new(store))
      .with_default_tenant("acme")
      .with_migrator(Arc::new(TableMigrator))
      .with_seeder(Arc::new(seeder))
      .build()
      .unwrap();

   accessor
      .stage_insert(
         "users",
         EntityKey::pending_sequential(),
         values(&[
            ("name", ColumnValue::Text("Alice".into())),
            ("age", ColumnValue::Integer(30)),
         ]),
      )
      .await;
   accessor.commit().await.unwrap();

   for descriptor in [
      &tenant.default_endpoint,
      tenant.descriptor_for(sqlite_tenant_accessor::EndpointRole::Write),
   ] {
      let endpoint = SqliteEndpoint::open(descriptor, None).await.unwrap();
      let (id, host): (String, String) = sqlx::query_as("SELECT id, host FROM tenants")
         .fetch_one(endpoint.read_pool().unwrap())
         .await
         .unwrap();
      assert_eq!(id, "acme");
      assert_eq!(host, "acme.example.com");
   }
}

#[tokio::test]
async fn test_empty_commit_is_a_noop() {
   let dir = TempDir::new().unwrap();
   let (accessor, tenant) = synchronized_accessor(&dir);

   let rows = accessor.commit().await.unwrap();
   assert_eq!(rows, 0);

   // No endpoint was ever touched
   assert!(!tenant.default_endpoint.as_path().exists());
   assert!(
      !tenant
         .descriptor_for(sqlite_tenant_accessor::EndpointRole::Write)
         .as_path()
         .exists()
   );
}
