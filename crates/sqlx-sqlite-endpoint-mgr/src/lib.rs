//! # sqlx-sqlite-endpoint-mgr
//!
//! Per-endpoint SQLite connection management for routing layers that bind a
//! logical session to one of several physical databases.
//!
//! ## Core Types
//!
//! - **[`ConnectionDescriptor`]**: Validated, immutable name of one endpoint
//! - **[`SqliteEndpoint`]**: Endpoint handle with separate read and write connection pools
//! - **[`EndpointConfig`]**: Configuration for connection pool settings
//! - **[`WriteGuard`]**: RAII guard ensuring exclusive write access, tagged with its descriptor
//! - **[`SwitchLocks`]** / **[`SwitchPermit`]**: Keyed exclusive locks serializing endpoint switches
//! - **[`Migrator`]**: Re-exported from sqlx for running database migrations
//! - **[`Error`]**: Error type for endpoint operations
//!
//! ## Architecture
//!
//! - **Connection pooling**: Separate read-only pool and write pool with a max of 1 connection
//! - **Lazy WAL mode**: Write-Ahead Logging enabled automatically on first write
//! - **Endpoint registry**: Open endpoints are cached process-wide by descriptor
//!   (in-memory databases excepted), so every holder of a descriptor shares pools
//! - **Switch locks**: Rebinding a session between endpoints is serialized per
//!   shared resource, with a deadline
//!
//! ## Usage
//!
//! ```no_run
//! use sqlx_sqlite_endpoint_mgr::{ConnectionDescriptor, SqliteEndpoint};
//!
//! #[tokio::main]
//! async fn main() -> sqlx_sqlite_endpoint_mgr::Result<()> {
//!     let descriptor = ConnectionDescriptor::new("tenants/acme/default.db")?;
//!     let endpoint = SqliteEndpoint::open(&descriptor, None).await?;
//!
//!     // Concurrent reads through the read pool
//!     let rows = sqlx::query("SELECT * FROM users")
//!         .fetch_all(endpoint.read_pool()?)
//!         .await?;
//!
//!     // Exclusive writes through the write guard (WAL enabled on first use)
//!     let mut writer = endpoint.acquire_writer().await?;
//!     sqlx::query("INSERT INTO users (name) VALUES (?)")
//!         .bind("Alice")
//!         .execute(&mut *writer)
//!         .await?;
//!     drop(writer);
//!
//!     endpoint.close().await?;
//!     Ok(())
//! }
//! ```

mod config;
mod descriptor;
mod endpoint;
mod error;
mod registry;
mod switch_lock;
mod write_guard;

// Re-export public types
pub use config::EndpointConfig;
pub use descriptor::ConnectionDescriptor;
pub use endpoint::SqliteEndpoint;
pub use error::Error;
pub use switch_lock::{SwitchLocks, SwitchPermit};
pub use write_guard::WriteGuard;

// Re-export sqlx migrate types for convenience
pub use sqlx::migrate::Migrator;

/// A type alias for Results with our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
