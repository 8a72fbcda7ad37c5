//! Change-set capture and replay-reset

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::IndexMap;
use serde_json::{Value as JsonValue, json};
use time::OffsetDateTime;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::Result;
use crate::change::{ChangeOperation, ColumnValue, EntityKey, EntityState};
use crate::entity::EntityHandle;
use crate::error::Error;

/// One staged row operation, not yet captured.
///
/// Sessions accumulate these; [`ChangeSet::capture`] snapshots them.
#[derive(Debug, Clone)]
pub struct PendingOp {
   pub kind: ChangeOperation,
   pub entity: Arc<EntityHandle>,
   /// Column values to write, in declaration order.
   pub values: IndexMap<String, ColumnValue>,
}

/// One operation as captured: kind, target, cloned values, and the entity's
/// pre-execution lifecycle state.
#[derive(Debug, Clone)]
pub struct CapturedOp {
   kind: ChangeOperation,
   entity: Arc<EntityHandle>,
   key_at_capture: EntityKey,
   values: IndexMap<String, ColumnValue>,
   prior_state: EntityState,
}

impl CapturedOp {
   pub fn kind(&self) -> ChangeOperation {
      self.kind
   }

   pub fn entity(&self) -> &Arc<EntityHandle> {
      &self.entity
   }

   pub fn table(&self) -> &str {
      self.entity.table()
   }

   /// The entity key as it was at capture time.
   pub fn key_at_capture(&self) -> &EntityKey {
      &self.key_at_capture
   }

   /// The captured column values. These are clones: mutating the live
   /// session after capture does not change them.
   pub fn values(&self) -> &IndexMap<String, ColumnValue> {
      &self.values
   }

   /// The entity's lifecycle state before first execution.
   pub fn prior_state(&self) -> EntityState {
      self.prior_state
   }
}

/// The ordered, replayable snapshot of one commit's pending operations.
///
/// A change set is consumed at most twice: once by the first execution
/// against the write endpoint, and optionally once more by a replay against
/// the default endpoint. Replay works strictly from the captured snapshot
/// (the live session is never re-read), so both endpoints receive identical
/// values even if the session was mutated in between.
#[derive(Debug)]
pub struct ChangeSet {
   id: Uuid,
   tenant: String,
   captured_at: OffsetDateTime,
   ops: Vec<CapturedOp>,
   replayed: AtomicBool,
}

impl ChangeSet {
   /// Snapshot `pending` into a replayable change set.
   ///
   /// Per operation this records the kind, the target entity handle, the key
   /// and lifecycle state as they are right now, and a clone of the column
   /// values. Updates and deletes require a resolvable key: either one
   /// already assigned, or an insert earlier in the same change set that
   /// will assign it during execution. Anything else fails with
   /// [`Error::UnkeyedOperation`].
   pub fn capture(
      tenant: impl Into<String>,
      pending: &[PendingOp],
      captured_at: OffsetDateTime,
   ) -> Result<Self> {
      let tenant = tenant.into();
      let mut ops = Vec::with_capacity(pending.len());
      let mut inserted: Vec<*const EntityHandle> = Vec::new();

      for op in pending {
         let key_at_capture = op.entity.key();
         let entity_ptr = Arc::as_ptr(&op.entity);

         match op.kind {
            ChangeOperation::Insert => inserted.push(entity_ptr),
            ChangeOperation::Update | ChangeOperation::Delete => {
               if !key_at_capture.is_assigned() && !inserted.contains(&entity_ptr) {
                  return Err(Error::UnkeyedOperation {
                     operation: op.kind.verb(),
                     table: op.entity.table().to_string(),
                  });
               }
            }
         }

         ops.push(CapturedOp {
            kind: op.kind,
            entity: Arc::clone(&op.entity),
            key_at_capture,
            values: op.values.clone(),
            prior_state: op.entity.state(),
         });
      }

      let set = Self {
         id: Uuid::new_v4(),
         tenant,
         captured_at,
         ops,
         replayed: AtomicBool::new(false),
      };

      trace!(change_set = %set.id, tenant = %set.tenant, ops = set.ops.len(), "Captured change set");

      Ok(set)
   }

   pub fn id(&self) -> Uuid {
      self.id
   }

   pub fn tenant(&self) -> &str {
      &self.tenant
   }

   pub fn captured_at(&self) -> OffsetDateTime {
      self.captured_at
   }

   pub fn ops(&self) -> &[CapturedOp] {
      &self.ops
   }

   pub fn len(&self) -> usize {
      self.ops.len()
   }

   pub fn is_empty(&self) -> bool {
      self.ops.is_empty()
   }

   /// Rewind every captured entity for a second execution.
   ///
   /// Restores each entity's lifecycle to its captured pre-execution state,
   /// and clears server-generated keys on inserts so the replica endpoint
   /// derives its own rather than blindly reusing the first endpoint's
   /// identifier. Fails with [`Error::AlreadyReplayed`] on a second call:
   /// a change set supports exactly one replay.
   pub fn reset_for_replay(&self) -> Result<()> {
      if self.replayed.swap(true, Ordering::SeqCst) {
         return Err(Error::AlreadyReplayed(self.id));
      }

      for op in &self.ops {
         op.entity.set_state(op.prior_state);

         if op.kind == ChangeOperation::Insert && op.key_at_capture.is_server_generated() {
            op.entity.clear_generated_key();
         }
      }

      debug!(change_set = %self.id, tenant = %self.tenant, "Reset change set for replay");

      Ok(())
   }

   /// JSON dump for logs and operator-driven manual replay.
   pub fn to_json(&self) -> JsonValue {
      json!({
         "id": self.id.to_string(),
         "tenant": self.tenant,
         "captured_at": self.captured_at.to_string(),
         "ops": self
            .ops
            .iter()
            .map(|op| {
               json!({
                  "op": op.kind.verb(),
                  "table": op.table(),
                  "key": op.key_at_capture.to_column_value().map(|v| v.to_json()),
                  "values": op
                     .values
                     .iter()
                     .map(|(column, value)| (column.clone(), value.to_json()))
                     .collect::<serde_json::Map<String, JsonValue>>(),
               })
            })
            .collect::<Vec<_>>(),
      })
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   fn now() -> OffsetDateTime {
      OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
   }

   fn insert_op(table: &str) -> PendingOp {
      let entity = EntityHandle::new(
         table,
         EntityKey::pending_sequential(),
         EntityState::PendingInsert,
      );
      let mut values = IndexMap::new();
      values.insert("name".to_string(), ColumnValue::Text("Alice".into()));
      PendingOp {
         kind: ChangeOperation::Insert,
         entity,
         values,
      }
   }

   #[test]
   fn test_capture_clones_values() {
      let mut op = insert_op("users");
      let set = ChangeSet::capture("acme", std::slice::from_ref(&op), now()).unwrap();

      // Mutate the live op after capture; the snapshot must not move
      op.values
         .insert("name".to_string(), ColumnValue::Text("Mallory".into()));

      assert_eq!(
         set.ops()[0].values()["name"],
         ColumnValue::Text("Alice".into())
      );
   }

   #[test]
   fn test_capture_rejects_unkeyed_update() {
      let entity = EntityHandle::new(
         "users",
         EntityKey::pending_sequential(),
         EntityState::PendingUpdate,
      );
      let op = PendingOp {
         kind: ChangeOperation::Update,
         entity,
         values: IndexMap::new(),
      };

      let err = ChangeSet::capture("acme", &[op], now()).unwrap_err();
      assert!(matches!(err, Error::UnkeyedOperation { .. }));
   }

   #[test]
   fn test_replay_reset_restores_state_and_clears_generated_key() {
      let op = insert_op("users");
      let entity = Arc::clone(&op.entity);
      let set = ChangeSet::capture("acme", &[op], now()).unwrap();

      // First execution: endpoint assigns a rowid and commits the entity
      entity.assign_generated_key(17);
      entity.mark_committed();

      set.reset_for_replay().unwrap();

      assert_eq!(entity.state(), EntityState::PendingInsert);
      assert_eq!(entity.key(), EntityKey::Sequential(None));
   }

   #[test]
   fn test_second_replay_is_rejected() {
      let set = ChangeSet::capture("acme", &[insert_op("users")], now()).unwrap();
      set.reset_for_replay().unwrap();

      let err = set.reset_for_replay().unwrap_err();
      assert!(matches!(err, Error::AlreadyReplayed(id) if id == set.id()));
   }

   #[test]
   fn test_deterministic_keys_survive_replay_reset() {
      let entity = EntityHandle::new(
         "tenants",
         EntityKey::Text("acme".into()),
         EntityState::PendingInsert,
      );
      let op = PendingOp {
         kind: ChangeOperation::Insert,
         entity: Arc::clone(&entity),
         values: IndexMap::new(),
      };
      let set = ChangeSet::capture("acme", &[op], now()).unwrap();

      entity.mark_committed();
      set.reset_for_replay().unwrap();

      assert_eq!(entity.key(), EntityKey::Text("acme".into()));
   }

   #[test]
   fn test_json_dump_carries_identity() {
      let set = ChangeSet::capture("acme", &[insert_op("users")], now()).unwrap();
      let dump = set.to_json();
      assert_eq!(dump["tenant"], "acme");
      assert_eq!(dump["ops"][0]["op"], "INSERT");
      assert_eq!(dump["ops"][0]["values"]["name"], "Alice");
   }
}
