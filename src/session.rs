//! Unit-of-work staging area for pending row operations

use std::sync::Arc;

use indexmap::IndexMap;
use sqlx_sqlite_changeset::{
   ChangeOperation, ColumnValue, EntityHandle, EntityKey, EntityState, PendingOp,
};

/// Pending write operations staged against the accessor's current tenant.
///
/// A session accumulates operations in staging order; a commit captures them
/// into a change set, executes it, and clears the session on success. On
/// failure the operations stay staged so the caller can retry.
#[derive(Debug, Default)]
pub struct Session {
   pending: Vec<PendingOp>,
}

impl Session {
   pub fn new() -> Self {
      Self::default()
   }

   /// Stage an insert and return the handle for follow-up operations.
   ///
   /// Pass [`EntityKey::pending_sequential`] to let the endpoint assign a
   /// rowid, or a uuid/text key for deterministic client-side identity.
   pub fn stage_insert(
      &mut self,
      table: impl Into<String>,
      key: EntityKey,
      values: IndexMap<String, ColumnValue>,
   ) -> Arc<EntityHandle> {
      let entity = EntityHandle::new(table, key, EntityState::PendingInsert);
      self.pending.push(PendingOp {
         kind: ChangeOperation::Insert,
         entity: Arc::clone(&entity),
         values,
      });
      entity
   }

   /// Stage an update of an existing entity.
   pub fn stage_update(
      &mut self,
      entity: &Arc<EntityHandle>,
      values: IndexMap<String, ColumnValue>,
   ) {
      entity.set_state(EntityState::PendingUpdate);
      self.pending.push(PendingOp {
         kind: ChangeOperation::Update,
         entity: Arc::clone(entity),
         values,
      });
   }

   /// Stage a delete of an existing entity.
   pub fn stage_delete(&mut self, entity: &Arc<EntityHandle>) {
      entity.set_state(EntityState::PendingDelete);
      self.pending.push(PendingOp {
         kind: ChangeOperation::Delete,
         entity: Arc::clone(entity),
         values: IndexMap::new(),
      });
   }

   /// The staged operations, in staging order.
   pub fn pending(&self) -> &[PendingOp] {
      &self.pending
   }

   /// Whether anything is staged.
   pub fn has_pending(&self) -> bool {
      !self.pending.is_empty()
   }

   /// Drop all staged operations (after a successful commit).
   pub(crate) fn clear(&mut self) {
      self.pending.clear();
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   fn values(pairs: &[(&str, ColumnValue)]) -> IndexMap<String, ColumnValue> {
      pairs
         .iter()
         .map(|(k, v)| (k.to_string(), v.clone()))
         .collect()
   }

   #[test]
   fn test_staging_preserves_order() {
      let mut session = Session::new();
      let entity = session.stage_insert(
         "users",
         EntityKey::pending_sequential(),
         values(&[("name", ColumnValue::Text("Alice".into()))]),
      );
      session.stage_update(&entity, values(&[("name", ColumnValue::Text("Bob".into()))]));
      session.stage_delete(&entity);

      let kinds: Vec<_> = session.pending().iter().map(|op| op.kind).collect();
      assert_eq!(
         kinds,
         vec![
            ChangeOperation::Insert,
            ChangeOperation::Update,
            ChangeOperation::Delete
         ]
      );
      assert_eq!(entity.state(), EntityState::PendingDelete);
   }

   #[test]
   fn test_clear_empties_the_session() {
      let mut session = Session::new();
      session.stage_insert("users", EntityKey::pending_sequential(), IndexMap::new());
      assert!(session.has_pending());

      session.clear();
      assert!(!session.has_pending());
   }
}
