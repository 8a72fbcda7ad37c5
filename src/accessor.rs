//! The accessor façade: one unit of work, tenant-routed

use std::sync::Arc;

use indexmap::IndexMap;
use sqlx_sqlite_changeset::{ChangeSet, ColumnValue, EntityHandle, EntityKey};
use sqlx_sqlite_endpoint_mgr::{ConnectionDescriptor, SqliteEndpoint, SwitchLocks};
use tokio::sync::Mutex;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::config::AccessorConfig;
use crate::engine::{ExecutionEngine, SqliteExecutionEngine};
use crate::error::{Error, Result};
use crate::guard::ReentryFlag;
use crate::migrate::{
   BootstrapSeeder, MigrationCoordinator, NoopSchemaMigrator, NoopSeeder, SchemaMigrator,
};
use crate::resolve::{TenantResolver, TenantStore};
use crate::routing::{EndpointRole, RoutingState};
use crate::session::Session;
use crate::tenant::TenantRecord;

/// Hook invoked before a commit captures the session.
pub type PreCommitHook = Box<dyn Fn(&Session) + Send + Sync>;
/// Hook invoked after a commit executed, with the change set and row count.
pub type PostCommitHook = Box<dyn Fn(&ChangeSet, u64) + Send + Sync>;

/// A unit of work bound to one database session, routing operations between
/// the current tenant's default and write endpoints.
///
/// The accessor is the façade over the whole routing core: tenant resolution,
/// the staging session, write separation, change-set synchronization, and
/// migration-coordinated endpoint switches. One accessor serves one logical
/// caller at a time; the shared resources underneath (endpoints, switch
/// locks, migration state) may be contended by other accessors and are
/// protected accordingly.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use sqlite_tenant_accessor::{
///     Accessor, ColumnValue, ConnectionDescriptor, EntityKey, StaticTenantStore, TenantRecord,
/// };
///
/// # async fn example() -> sqlite_tenant_accessor::Result<()> {
/// let store = StaticTenantStore::new([TenantRecord::single_endpoint(
///     "acme",
///     ConnectionDescriptor::new("acme.db")?,
/// )])?;
///
/// let accessor = Accessor::builder()
///     .with_tenant_store(Arc::new(store))
///     .with_default_tenant("acme")
///     .build()?;
///
/// accessor
///     .stage_insert(
///         "users",
///         EntityKey::pending_sequential(),
///         [("name".to_string(), ColumnValue::Text("Alice".into()))]
///             .into_iter()
///             .collect(),
///     )
///     .await;
/// let rows = accessor.commit().await?;
/// assert_eq!(rows, 1);
/// # Ok(())
/// # }
/// ```
pub struct Accessor {
   resolver: TenantResolver,
   engine: Arc<dyn ExecutionEngine>,
   migrator: Arc<dyn SchemaMigrator>,
   seeder: Arc<dyn BootstrapSeeder>,
   clock: Arc<dyn Clock>,
   coordinator: Arc<MigrationCoordinator>,
   locks: &'static SwitchLocks,
   pub(crate) config: AccessorConfig,
   routing: Mutex<RoutingState>,
   session: Mutex<Session>,
   from_migrate: ReentryFlag,
   from_commit: ReentryFlag,
   pre_commit: Option<PreCommitHook>,
   post_commit: Option<PostCommitHook>,
}

impl std::fmt::Debug for Accessor {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("Accessor").finish_non_exhaustive()
   }
}

impl Accessor {
   /// Start building an accessor.
   pub fn builder() -> AccessorBuilder {
      AccessorBuilder::default()
   }

   /// Commit the session's staged operations.
   ///
   /// For tenants that separate writes this routes through the full
   /// switch/commit/replay/restore cycle; otherwise it executes directly
   /// against the current endpoint. Returns the rows affected by the write
   /// phase. Committing an empty session is a no-op returning 0.
   pub async fn commit(&self) -> Result<u64> {
      let _commit_scope = self.from_commit.enter();

      if !self.session.lock().await.has_pending() {
         return Ok(0);
      }

      let mut routing = self.routing.lock().await;

      // Migration-internal commits must never re-enter write separation
      let separate = routing.tenant.separates_writes() && !self.from_migrate.is_set();

      if separate {
         self.run_separated(&mut routing).await
      } else {
         let (rows_affected, _) = self.local_commit(&mut routing, false).await?;
         Ok(rows_affected)
      }
   }

   /// Bring the currently routed endpoint's schema up to date.
   ///
   /// Returns the number of migration revisions applied; a second call on an
   /// already current endpoint applies zero. Reachable directly by callers
   /// and indirectly from every routing switch.
   pub async fn migrate(&self) -> Result<u64> {
      let mut routing = self.routing.lock().await;
      let descriptor = routing.descriptor().clone();

      let key = format!("{}/{}", routing.tenant.name, descriptor);
      let _permit = self
         .locks
         .acquire(key, self.config.switch_timeout())
         .await?;

      self.ensure_endpoint_ready(&mut routing, &descriptor).await
   }

   /// Route to one of the current tenant's endpoints.
   ///
   /// Returns whether anything changed: selecting a role whose descriptor is
   /// already live (always the case for tenants without a distinct write
   /// endpoint) is a no-op.
   pub async fn change_connection(&self, role: EndpointRole) -> Result<bool> {
      let mut routing = self.routing.lock().await;
      self.switch_routing(&mut routing, role).await
   }

   /// Re-resolve the tenant from `host` and rebind to its default endpoint.
   ///
   /// Returns whether the tenant changed. Unknown hosts fall back to the
   /// default tenant.
   pub async fn change_tenant(&self, host: Option<&str>) -> Result<bool> {
      let tenant = self.resolver.resolve(host);
      let mut routing = self.routing.lock().await;

      if routing.tenant.name == tenant.name {
         return Ok(false);
      }

      let descriptor = tenant.descriptor_for(EndpointRole::Default).clone();
      let key = format!("{}/{}", tenant.name, descriptor);
      let _permit = self
         .locks
         .acquire(key, self.config.switch_timeout())
         .await?;

      debug!(
         from = %routing.tenant.name,
         to = %tenant.name,
         "Switching tenant"
      );

      *routing = RoutingState::bind(tenant);
      self.ensure_endpoint_ready(&mut routing, &descriptor).await?;
      self.open_endpoint(&mut routing).await?;

      Ok(true)
   }

   /// Stage an insert into the session.
   pub async fn stage_insert(
      &self,
      table: impl Into<String>,
      key: EntityKey,
      values: IndexMap<String, ColumnValue>,
   ) -> Arc<EntityHandle> {
      self.session.lock().await.stage_insert(table, key, values)
   }

   /// Stage an update of an existing entity.
   pub async fn stage_update(
      &self,
      entity: &Arc<EntityHandle>,
      values: IndexMap<String, ColumnValue>,
   ) {
      self.session.lock().await.stage_update(entity, values);
   }

   /// Stage a delete of an existing entity.
   pub async fn stage_delete(&self, entity: &Arc<EntityHandle>) {
      self.session.lock().await.stage_delete(entity);
   }

   /// Whether the session has staged operations.
   pub async fn has_pending(&self) -> bool {
      self.session.lock().await.has_pending()
   }

   /// The currently routed endpoint, opened on demand.
   ///
   /// Fails with [`Error::RoutingInFlux`] when a switch (or a commit holding
   /// the routing state) is in progress; the caller should retry.
   pub async fn read_endpoint(&self) -> Result<Arc<SqliteEndpoint>> {
      let mut routing = self.routing.try_lock().map_err(|_| Error::RoutingInFlux)?;
      self.open_endpoint(&mut routing).await
   }

   /// The currently routed descriptor.
   ///
   /// Fails with [`Error::RoutingInFlux`] mid-switch.
   pub fn current_descriptor(&self) -> Result<ConnectionDescriptor> {
      let routing = self.routing.try_lock().map_err(|_| Error::RoutingInFlux)?;
      Ok(routing.descriptor().clone())
   }

   /// The currently bound tenant.
   ///
   /// Fails with [`Error::RoutingInFlux`] mid-switch.
   pub fn current_tenant(&self) -> Result<TenantRecord> {
      let routing = self.routing.try_lock().map_err(|_| Error::RoutingInFlux)?;
      Ok(routing.tenant.clone())
   }

   /// The tenant resolver this accessor was built with.
   pub fn resolver(&self) -> &TenantResolver {
      &self.resolver
   }

   pub(crate) fn engine(&self) -> &dyn ExecutionEngine {
      self.engine.as_ref()
   }

   pub(crate) fn switch_locks(&self) -> &SwitchLocks {
      self.locks
   }

   /// Execute the session against the current endpoint.
   ///
   /// Runs pre-commit hooks, captures the change set, executes it through
   /// the engine, clears the session, runs post-commit hooks. When
   /// `retain_for_sync` is set the captured change set is returned for the
   /// replay phase.
   pub(crate) async fn local_commit(
      &self,
      routing: &mut RoutingState,
      retain_for_sync: bool,
   ) -> Result<(u64, Option<ChangeSet>)> {
      let mut session = self.session.lock().await;

      if !session.has_pending() {
         return Ok((0, None));
      }

      if let Some(hook) = &self.pre_commit {
         hook(&session);
      }

      let change_set =
         ChangeSet::capture(&routing.tenant.name, session.pending(), self.clock.now())?;

      let endpoint = self.open_endpoint(routing).await?;
      let rows_affected = self.engine.execute(&endpoint, &change_set).await?;

      session.clear();

      if let Some(hook) = &self.post_commit {
         hook(&change_set, rows_affected);
      }

      Ok((rows_affected, retain_for_sync.then_some(change_set)))
   }

   /// Make `descriptor` schema-ready, seeding bootstrap data when its schema
   /// was just created.
   ///
   /// Recursion-guarded: a call already inside migration returns immediately
   /// and lets the outer call finish the job. The bootstrap follow-up commit
   /// runs here, inside the guard scope, directly through the engine; it is
   /// part of migration and must never re-enter write separation.
   ///
   /// Returns the number of migration revisions applied.
   pub(crate) async fn ensure_endpoint_ready(
      &self,
      routing: &mut RoutingState,
      descriptor: &ConnectionDescriptor,
   ) -> Result<u64> {
      let Some(_migrate_scope) = self.from_migrate.enter() else {
         return Ok(0);
      };

      let outcome = self
         .coordinator
         .prepare(descriptor, self.migrator.as_ref())
         .await?;

      if outcome.created {
         let endpoint = self.open_endpoint(routing).await?;

         let mut bootstrap = Session::new();
         let seeded = self.seeder.seed(descriptor, &mut bootstrap).await?;

         if seeded && bootstrap.has_pending() {
            let change_set = ChangeSet::capture(
               &routing.tenant.name,
               bootstrap.pending(),
               self.clock.now(),
            )?;
            let rows_affected = self.engine.execute(&endpoint, &change_set).await?;

            debug!(
               tenant = %routing.tenant.name,
               endpoint = %descriptor,
               rows_affected,
               "Committed bootstrap data"
            );
         }
      }

      Ok(outcome.applied)
   }

   /// Current (from_migrate, from_commit) reentry flags.
   #[doc(hidden)]
   pub fn reentry_flags_for_testing(&self) -> (bool, bool) {
      (self.from_migrate.is_set(), self.from_commit.is_set())
   }
}

/// Builder for [`Accessor`].
///
/// A tenant store and default tenant name are required; every collaborator
/// has a working default (sqlx statement engine, no-op migrator and seeder,
/// wall clock, fresh migration coordinator).
#[derive(Default)]
pub struct AccessorBuilder {
   store: Option<Arc<dyn TenantStore>>,
   default_tenant: Option<String>,
   engine: Option<Arc<dyn ExecutionEngine>>,
   migrator: Option<Arc<dyn SchemaMigrator>>,
   seeder: Option<Arc<dyn BootstrapSeeder>>,
   clock: Option<Arc<dyn Clock>>,
   coordinator: Option<Arc<MigrationCoordinator>>,
   config: AccessorConfig,
   pre_commit: Option<PreCommitHook>,
   post_commit: Option<PostCommitHook>,
}

impl AccessorBuilder {
   /// Sets the tenant store (required).
   pub fn with_tenant_store(mut self, store: Arc<dyn TenantStore>) -> Self {
      self.store = Some(store);
      self
   }

   /// Sets the default tenant name (required).
   pub fn with_default_tenant(mut self, name: impl Into<String>) -> Self {
      self.default_tenant = Some(name.into());
      self
   }

   /// Sets the execution engine. Default: [`SqliteExecutionEngine`].
   pub fn with_engine(mut self, engine: Arc<dyn ExecutionEngine>) -> Self {
      self.engine = Some(engine);
      self
   }

   /// Sets the schema migrator. Default: [`NoopSchemaMigrator`].
   pub fn with_migrator(mut self, migrator: Arc<dyn SchemaMigrator>) -> Self {
      self.migrator = Some(migrator);
      self
   }

   /// Sets the bootstrap seeder. Default: [`NoopSeeder`].
   pub fn with_seeder(mut self, seeder: Arc<dyn BootstrapSeeder>) -> Self {
      self.seeder = Some(seeder);
      self
   }

   /// Sets the clock used for change-set audit stamps. Default: wall clock.
   pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
      self.clock = Some(clock);
      self
   }

   /// Shares a migration coordinator across accessors. Default: a fresh one.
   pub fn with_migration_coordinator(mut self, coordinator: Arc<MigrationCoordinator>) -> Self {
      self.coordinator = Some(coordinator);
      self
   }

   /// Sets deadlines and endpoint pool settings.
   pub fn with_config(mut self, config: AccessorConfig) -> Self {
      self.config = config;
      self
   }

   /// Installs a hook run before each commit captures the session.
   pub fn with_pre_commit_hook(mut self, hook: PreCommitHook) -> Self {
      self.pre_commit = Some(hook);
      self
   }

   /// Installs a hook run after each commit executes.
   pub fn with_post_commit_hook(mut self, hook: PostCommitHook) -> Self {
      self.post_commit = Some(hook);
      self
   }

   /// Build the accessor, bound to the default tenant's default endpoint.
   ///
   /// Fails with [`Error::Configuration`] when the store or default tenant
   /// is missing or the default tenant does not resolve.
   pub fn build(self) -> Result<Accessor> {
      let store = self
         .store
         .ok_or_else(|| Error::Configuration("a tenant store is required".into()))?;
      let default_tenant = self
         .default_tenant
         .ok_or_else(|| Error::Configuration("a default tenant name is required".into()))?;

      let resolver = TenantResolver::new(store, &default_tenant)?;
      let initial = resolver.default_tenant().clone();

      Ok(Accessor {
         resolver,
         engine: self
            .engine
            .unwrap_or_else(|| Arc::new(SqliteExecutionEngine::default())),
         migrator: self.migrator.unwrap_or_else(|| Arc::new(NoopSchemaMigrator)),
         seeder: self.seeder.unwrap_or_else(|| Arc::new(NoopSeeder)),
         clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
         coordinator: self
            .coordinator
            .unwrap_or_else(|| Arc::new(MigrationCoordinator::new())),
         locks: SwitchLocks::global(),
         config: self.config,
         routing: Mutex::new(RoutingState::bind(initial)),
         session: Mutex::new(Session::new()),
         from_migrate: ReentryFlag::default(),
         from_commit: ReentryFlag::default(),
         pre_commit: self.pre_commit,
         post_commit: self.post_commit,
      })
   }
}
