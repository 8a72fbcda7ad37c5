//! Write-separation orchestration
//!
//! The template behind every separated commit: switch to the write endpoint,
//! run the caller's commit, optionally replay the captured change set onto
//! the default endpoint, then restore whatever routing was live before. The
//! write phase is all-or-nothing; the restore phase is best-effort and logs
//! instead of masking the primary result.

use sqlx_sqlite_changeset::ChangeSet;
use sqlx_sqlite_endpoint_mgr::SqliteEndpoint;
use tracing::{debug, error, warn};

use crate::accessor::Accessor;
use crate::error::{Error, Result};
use crate::routing::{EndpointRole, RoutingState};

impl Accessor {
   /// Run one separated commit: write endpoint first, then (for synchronized
   /// tenants) a replay onto the default endpoint, then restore.
   ///
   /// Returns the write phase's rows-affected count; the replay writes the
   /// same rows by construction. A replay failure or deadline expiry after
   /// the write committed surfaces as [`Error::PartialSynchronization`]: the
   /// write is durable at that point and must not be reported as failed
   /// outright.
   pub(crate) async fn run_separated(&self, routing: &mut RoutingState) -> Result<u64> {
      let (previous_tenant, previous_role) = routing.snapshot();

      self.switch_routing(routing, EndpointRole::Write).await?;

      let sync_enabled = routing.tenant.data_synchronization_enabled;
      let (rows_affected, captured) = self.local_commit(routing, sync_enabled).await?;

      let mut sync_result = Ok(());
      if let Some(change_set) = captured {
         sync_result = self.replay_onto_default(routing, &change_set).await;
      }

      // The tenant cannot change under us while the routing mutex is held;
      // the snapshot comparison mirrors the restore contract anyway.
      if routing.tenant.name == previous_tenant && routing.role != previous_role {
         if let Err(restore_err) = self.switch_routing(routing, previous_role).await {
            error!(
               tenant = %routing.tenant.name,
               "Failed to restore routing after separated commit: {restore_err}"
            );
         }
      }

      sync_result?;

      Ok(rows_affected)
   }

   /// Replay `change_set` onto the tenant's default endpoint, under the
   /// configured replay deadline.
   async fn replay_onto_default(
      &self,
      routing: &mut RoutingState,
      change_set: &ChangeSet,
   ) -> Result<()> {
      let deadline = self.config.replay_deadline();

      let attempt = async {
         self.switch_routing(routing, EndpointRole::Default).await?;
         change_set.reset_for_replay()?;

         let endpoint = self.open_endpoint(routing).await?;
         let replayed_rows = self.engine().execute(&endpoint, change_set).await?;

         debug!(
            tenant = %change_set.tenant(),
            change_set = %change_set.id(),
            replayed_rows,
            "Replayed change set onto default endpoint"
         );

         Ok(())
      };

      let result = match tokio::time::timeout(deadline, attempt).await {
         Ok(result) => result,
         Err(_) => Err(Error::DeadlineExceeded {
            what: "replaying change set onto the default endpoint",
            secs: deadline.as_secs(),
         }),
      };

      result.map_err(|source| {
         // The operator dump is the recovery path; losing it silently would
         // make the partial state unrecoverable.
         warn!(
            tenant = %change_set.tenant(),
            change_set = %change_set.id(),
            dump = %change_set.to_json(),
            "Change set requires manual replay: {source}"
         );

         Error::PartialSynchronization {
            tenant: change_set.tenant().to_string(),
            change_set_id: change_set.id(),
            source: Box::new(source),
         }
      })
   }

   /// Rebind the routing state to the tenant's endpoint for `role`.
   ///
   /// A no-op when the target descriptor is already live (notably when write
   /// and default descriptors coincide). Otherwise: take the switch lock for
   /// the shared resource, release the current endpoint binding, make the
   /// target schema-ready, and open the target endpoint. A failure part-way
   /// leaves the routing state at the point of failure.
   pub(crate) async fn switch_routing(
      &self,
      routing: &mut RoutingState,
      role: EndpointRole,
   ) -> Result<bool> {
      let target = routing.tenant.descriptor_for(role).clone();

      if routing.descriptor() == &target {
         routing.role = role;
         return Ok(false);
      }

      let key = format!("{}/{}", routing.tenant.name, target);
      let _permit = self
         .switch_locks()
         .acquire(key, self.config.switch_timeout())
         .await?;

      if let Some(endpoint) = routing.endpoint.take() {
         debug!(
            tenant = %routing.tenant.name,
            from = %endpoint.descriptor(),
            to = %target,
            "Switching endpoint"
         );
      }

      routing.role = role;

      self.ensure_endpoint_ready(routing, &target).await?;
      self.open_endpoint(routing).await?;

      Ok(true)
   }

   /// Open (or return) the live endpoint handle for the current descriptor.
   pub(crate) async fn open_endpoint(
      &self,
      routing: &mut RoutingState,
   ) -> Result<std::sync::Arc<SqliteEndpoint>> {
      if let Some(endpoint) = &routing.endpoint {
         return Ok(std::sync::Arc::clone(endpoint));
      }

      let endpoint = SqliteEndpoint::open(
         routing.descriptor(),
         Some(self.config.endpoint.clone()),
      )
      .await?;
      routing.endpoint = Some(std::sync::Arc::clone(&endpoint));

      Ok(endpoint)
   }
}
