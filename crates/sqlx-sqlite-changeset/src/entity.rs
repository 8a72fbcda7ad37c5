//! Shared entity handles with mutable lifecycle state

use std::sync::Arc;

use parking_lot::Mutex;

use crate::change::{EntityKey, EntityState};

/// Handle to one logical entity staged in a session.
///
/// The handle is shared between the session that staged it, the change set
/// that captured it, and the engine that executes it: executing flips the
/// lifecycle to [`EntityState::Committed`] and may assign a server-generated
/// key, and a replay rewinds both through the captured snapshot.
#[derive(Debug)]
pub struct EntityHandle {
   table: String,
   key: Mutex<EntityKey>,
   state: Mutex<EntityState>,
}

impl EntityHandle {
   /// Create a handle in the staging state matching `state`.
   pub fn new(table: impl Into<String>, key: EntityKey, state: EntityState) -> Arc<Self> {
      Arc::new(Self {
         table: table.into(),
         key: Mutex::new(key),
         state: Mutex::new(state),
      })
   }

   /// Table this entity lives in.
   pub fn table(&self) -> &str {
      &self.table
   }

   /// Current key (clone of the live value).
   pub fn key(&self) -> EntityKey {
      self.key.lock().clone()
   }

   /// Current lifecycle state.
   pub fn state(&self) -> EntityState {
      *self.state.lock()
   }

   /// Record a server-generated sequential key after an insert executed.
   ///
   /// No-op for uuid/text keys, which are never endpoint-derived.
   pub fn assign_generated_key(&self, id: i64) {
      let mut key = self.key.lock();
      if let EntityKey::Sequential(value) = &mut *key {
         *value = Some(id);
      }
   }

   /// Drop a server-generated key so a replica derives its own.
   pub fn clear_generated_key(&self) {
      let mut key = self.key.lock();
      if let EntityKey::Sequential(value) = &mut *key {
         *value = None;
      }
   }

   /// Mark the entity as committed (called by the engine after execution).
   pub fn mark_committed(&self) {
      *self.state.lock() = EntityState::Committed;
   }

   /// Set the lifecycle state directly.
   ///
   /// Two callers: a session staging a further operation on an existing
   /// handle, and a replay rewinding to a captured pre-execution state.
   pub fn set_state(&self, state: EntityState) {
      *self.state.lock() = state;
   }
}
