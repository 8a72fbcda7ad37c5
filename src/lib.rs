//! # sqlite-tenant-accessor
//!
//! A tenant-scoped data-access core for SQLite: each tenant owns a
//! read/default endpoint and a write endpoint, commits route to the write
//! endpoint, and (when the tenant enables synchronization) every committed
//! change set is replayed onto the default endpoint so reads stay eventually
//! consistent. Endpoint switches are serialized by keyed locks and
//! coordinated with schema migration, so a freshly provisioned endpoint is
//! made ready (schema created, revisions applied, bootstrap rows seeded)
//! before it serves its first operation.
//!
//! ## Core Types
//!
//! - **[`Accessor`]**: the unit-of-work façade: `commit()`, `migrate()`,
//!   `change_connection()`, `change_tenant()`, and session staging
//! - **[`TenantRecord`]** / **[`TenantResolver`]** / **[`StaticTenantStore`]**:
//!   tenant routing configuration and resolution
//! - **[`Session`]**: the staging area captured into a [`ChangeSet`] per commit
//! - **[`ExecutionEngine`]** / **[`SchemaMigrator`]** / **[`BootstrapSeeder`]** /
//!   **[`Clock`]**: collaborator seams, each with a working default
//! - **[`Error`]**: the error taxonomy, with machine-readable `error_code()`s
//!
//! ## Routing guarantees
//!
//! Within one separated commit the write-endpoint execution always happens
//! before the default-endpoint replay, and routing restoration happens after
//! both. The write phase is all-or-nothing; replay failure after a durable
//! write surfaces as [`Error::PartialSynchronization`] carrying the change
//! set identity, and routing restoration is best-effort (logged, never
//! masking the primary result).
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use sqlite_tenant_accessor::{
//!     Accessor, ColumnValue, ConnectionDescriptor, EntityKey, StaticTenantStore, TenantRecord,
//! };
//!
//! #[tokio::main]
//! async fn main() -> sqlite_tenant_accessor::Result<()> {
//!     let store = StaticTenantStore::new([TenantRecord {
//!         name: "acme".into(),
//!         host: Some("acme.example.com".into()),
//!         default_endpoint: ConnectionDescriptor::new("tenants/acme/default.db")?,
//!         write_endpoint: Some(ConnectionDescriptor::new("tenants/acme/write.db")?),
//!         writing_separation_enabled: true,
//!         data_synchronization_enabled: true,
//!     }])?;
//!
//!     let accessor = Accessor::builder()
//!         .with_tenant_store(Arc::new(store))
//!         .with_default_tenant("acme")
//!         .build()?;
//!
//!     accessor
//!         .stage_insert(
//!             "users",
//!             EntityKey::pending_sequential(),
//!             [("name".to_string(), ColumnValue::Text("Alice".into()))]
//!                 .into_iter()
//!                 .collect(),
//!         )
//!         .await;
//!
//!     // Committed on the write endpoint, replayed onto the default one
//!     let rows = accessor.commit().await?;
//!     assert_eq!(rows, 1);
//!     Ok(())
//! }
//! ```

mod accessor;
mod clock;
mod config;
mod engine;
mod error;
mod guard;
mod migrate;
mod resolve;
mod routing;
mod separation;
mod session;
mod tenant;

pub use accessor::{Accessor, AccessorBuilder, PostCommitHook, PreCommitHook};
pub use clock::{Clock, SystemClock};
pub use config::AccessorConfig;
pub use engine::{ExecutionEngine, SqliteExecutionEngine};
pub use error::{Error, Result};
pub use migrate::{
   BootstrapSeeder, EndpointSchemaState, MigrationCoordinator, NoopSchemaMigrator, NoopSeeder,
   PrepareOutcome, SchemaMigrator, SeedRow, SqlxSchemaMigrator, StaticSeeder,
};
pub use resolve::{StaticTenantStore, TenantResolver, TenantStore};
pub use routing::EndpointRole;
pub use session::Session;
pub use tenant::TenantRecord;

// Re-export the endpoint and change-set vocabulary so callers need only this crate
pub use sqlx_sqlite_changeset::{
   ChangeOperation, ChangeSet, ColumnValue, EntityHandle, EntityKey, EntityState, PendingOp,
};
pub use sqlx_sqlite_endpoint_mgr::{
   ConnectionDescriptor, EndpointConfig, Migrator, SqliteEndpoint, SwitchLocks, SwitchPermit,
   WriteGuard,
};
