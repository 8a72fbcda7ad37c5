//! Connection descriptors naming one physical SQLite endpoint

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// An immutable, validated name for one reachable SQLite endpoint.
///
/// A descriptor wraps the path (or `:memory:` URI) of a database file. It is
/// the identity used by the endpoint registry and by switch locks, so two
/// descriptors compare equal exactly when they name the same endpoint string.
///
/// # Example
///
/// ```
/// use sqlx_sqlite_endpoint_mgr::ConnectionDescriptor;
///
/// let d = ConnectionDescriptor::new("tenants/acme/default.db").unwrap();
/// assert!(!d.is_memory());
/// assert_eq!(d.as_str(), "tenants/acme/default.db");
///
/// assert!(ConnectionDescriptor::new("").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConnectionDescriptor(String);

impl ConnectionDescriptor {
   /// Create a descriptor from a raw connection string.
   ///
   /// Fails with [`Error::EmptyDescriptor`] when the string is empty; there is
   /// no other validation here since SQLite accepts nearly any path.
   pub fn new(raw: impl Into<String>) -> Result<Self, Error> {
      let raw = raw.into();
      if raw.trim().is_empty() {
         return Err(Error::EmptyDescriptor);
      }
      Ok(Self(raw))
   }

   /// The raw connection string.
   pub fn as_str(&self) -> &str {
      &self.0
   }

   /// The descriptor interpreted as a filesystem path.
   pub fn as_path(&self) -> &Path {
      Path::new(&self.0)
   }

   /// Whether this descriptor names an in-memory database.
   ///
   /// In-memory endpoints are never cached in the registry: every open
   /// produces an independent database.
   pub fn is_memory(&self) -> bool {
      self.0 == ":memory:" || self.0.contains("mode=memory")
   }

   /// Path of the WAL sidecar file for this endpoint.
   pub(crate) fn wal_path(&self) -> PathBuf {
      PathBuf::from(format!("{}-wal", self.0))
   }

   /// Path of the shared-memory sidecar file for this endpoint.
   pub(crate) fn shm_path(&self) -> PathBuf {
      PathBuf::from(format!("{}-shm", self.0))
   }
}

impl fmt::Display for ConnectionDescriptor {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(&self.0)
   }
}

impl TryFrom<String> for ConnectionDescriptor {
   type Error = Error;

   fn try_from(raw: String) -> Result<Self, Error> {
      Self::new(raw)
   }
}

impl From<ConnectionDescriptor> for String {
   fn from(descriptor: ConnectionDescriptor) -> Self {
      descriptor.0
   }
}
