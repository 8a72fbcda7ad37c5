//! Operation kinds, column values, and entity identifiers

use serde_json::Value as JsonValue;
use uuid::Uuid;

/// The kind of a single row-level write operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeOperation {
   Insert,
   Update,
   Delete,
}

impl ChangeOperation {
   /// SQL verb for this operation, used in logging and statement rendering.
   pub fn verb(&self) -> &'static str {
      match self {
         ChangeOperation::Insert => "INSERT",
         ChangeOperation::Update => "UPDATE",
         ChangeOperation::Delete => "DELETE",
      }
   }
}

/// Typed column value destined for a SQLite endpoint.
///
/// The closed set of SQLite storage classes; a captured operation carries one
/// of these per column, cloned at capture time so later mutation of the live
/// session cannot change what a replay writes.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
   Null,
   Integer(i64),
   Real(f64),
   Text(String),
   Blob(Vec<u8>),
}

impl ColumnValue {
   /// Returns true if this value is null.
   pub fn is_null(&self) -> bool {
      matches!(self, ColumnValue::Null)
   }

   /// Attempts to get this value as an integer.
   pub fn as_integer(&self) -> Option<i64> {
      match self {
         ColumnValue::Integer(i) => Some(*i),
         _ => None,
      }
   }

   /// Attempts to get this value as a string reference.
   pub fn as_text(&self) -> Option<&str> {
      match self {
         ColumnValue::Text(s) => Some(s),
         _ => None,
      }
   }

   /// JSON rendering for logs and operator dumps.
   ///
   /// Blobs become base64 strings since JSON has no binary type; everything
   /// else maps to its natural JSON counterpart.
   pub fn to_json(&self) -> JsonValue {
      match self {
         ColumnValue::Null => JsonValue::Null,
         ColumnValue::Integer(i) => JsonValue::Number((*i).into()),
         ColumnValue::Real(r) => JsonValue::from(*r),
         ColumnValue::Text(s) => JsonValue::String(s.clone()),
         ColumnValue::Blob(b) => JsonValue::String(base64_encode(b)),
      }
   }
}

/// Base64 encode binary data for JSON serialization.
fn base64_encode(data: &[u8]) -> String {
   use base64::Engine;
   base64::engine::general_purpose::STANDARD.encode(data)
}

/// Logical identifier of one entity, as a closed set of key strategies.
///
/// - `Sequential`: server-generated rowid; `None` until the endpoint assigns
///   one. Replay clears assigned values so the replica derives its own.
/// - `Uuid` / `Text`: deterministic client-side keys, identical on every
///   endpoint, replayed verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKey {
   Sequential(Option<i64>),
   Uuid(Uuid),
   Text(String),
}

impl EntityKey {
   /// A sequential key with no assigned value yet.
   pub fn pending_sequential() -> Self {
      EntityKey::Sequential(None)
   }

   /// Whether a concrete value is present (always true for uuid/text keys).
   pub fn is_assigned(&self) -> bool {
      !matches!(self, EntityKey::Sequential(None))
   }

   /// Whether this key is derived by the endpoint rather than the client.
   pub fn is_server_generated(&self) -> bool {
      matches!(self, EntityKey::Sequential(_))
   }

   /// The key as a bindable column value, when assigned.
   pub fn to_column_value(&self) -> Option<ColumnValue> {
      match self {
         EntityKey::Sequential(Some(id)) => Some(ColumnValue::Integer(*id)),
         EntityKey::Sequential(None) => None,
         EntityKey::Uuid(u) => Some(ColumnValue::Text(u.to_string())),
         EntityKey::Text(s) => Some(ColumnValue::Text(s.clone())),
      }
   }
}

/// Lifecycle state of an entity handle.
///
/// Executing an operation moves its entity to `Committed`; a replay first
/// restores the pre-execution state captured with the operation, since a
/// committed handle would otherwise be unusable for the second pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
   PendingInsert,
   PendingUpdate,
   PendingDelete,
   Committed,
}

impl EntityState {
   /// The staging state matching an operation kind.
   pub fn for_operation(kind: ChangeOperation) -> Self {
      match kind {
         ChangeOperation::Insert => EntityState::PendingInsert,
         ChangeOperation::Update => EntityState::PendingUpdate,
         ChangeOperation::Delete => EntityState::PendingDelete,
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_blob_renders_as_base64() {
      let v = ColumnValue::Blob(b"hello".to_vec());
      assert_eq!(v.to_json(), JsonValue::String("aGVsbG8=".into()));
   }

   #[test]
   fn test_key_assignment_states() {
      assert!(!EntityKey::pending_sequential().is_assigned());
      assert!(EntityKey::Sequential(Some(7)).is_assigned());
      assert!(EntityKey::Text("acme".into()).is_assigned());
      assert!(EntityKey::Sequential(None).is_server_generated());
      assert!(!EntityKey::Uuid(Uuid::new_v4()).is_server_generated());
   }

   #[test]
   fn test_state_for_operation() {
      assert_eq!(
         EntityState::for_operation(ChangeOperation::Insert),
         EntityState::PendingInsert
      );
      assert_eq!(
         EntityState::for_operation(ChangeOperation::Delete),
         EntityState::PendingDelete
      );
   }
}
