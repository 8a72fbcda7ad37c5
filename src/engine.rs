//! Change-set execution against a routed endpoint

use async_trait::async_trait;
use sqlx::sqlite::SqliteArguments;
use sqlx_sqlite_changeset::{ChangeOperation, ChangeSet, ColumnValue};
use sqlx_sqlite_endpoint_mgr::SqliteEndpoint;
use tracing::{debug, error, trace};

use crate::error::{Error, Result};

/// Turns a captured change set into physical statements against one endpoint.
///
/// External collaborator boundary: the accessor core routes and sequences,
/// implementations execute. The engine is invoked once against the write
/// endpoint and, for synchronized tenants, a second time against the default
/// endpoint with the identical change set.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
   /// Execute every operation of `change_set` against `endpoint`, in order,
   /// atomically. Returns the total number of rows affected.
   ///
   /// Implementations must mark executed entities committed and assign
   /// server-generated keys to sequential-key inserts, since replay depends
   /// on both.
   async fn execute(&self, endpoint: &SqliteEndpoint, change_set: &ChangeSet) -> Result<u64>;
}

/// Default [`ExecutionEngine`]: renders captured operations to
/// INSERT/UPDATE/DELETE statements and runs them in one immediate
/// transaction on the endpoint's write connection.
///
/// Key columns follow a single-column convention (`id` unless overridden):
///
/// ```
/// use sqlite_tenant_accessor::SqliteExecutionEngine;
///
/// let engine = SqliteExecutionEngine::default().with_key_column("tenant_id");
/// ```
pub struct SqliteExecutionEngine {
   key_column: String,
}

impl Default for SqliteExecutionEngine {
   fn default() -> Self {
      Self {
         key_column: "id".to_string(),
      }
   }
}

impl SqliteExecutionEngine {
   /// Sets the name of the key column used in WHERE clauses and keyed inserts.
   pub fn with_key_column(mut self, column: impl Into<String>) -> Self {
      self.key_column = column.into();
      self
   }

   async fn execute_ops(
      &self,
      conn: &mut sqlx::sqlite::SqliteConnection,
      change_set: &ChangeSet,
   ) -> Result<u64> {
      let mut rows_affected = 0u64;

      for op in change_set.ops() {
         let table = op.table();
         // Identity comes from the live handle: an insert earlier in this
         // change set may have assigned the key this operation targets.
         let live_key = op.entity().key();

         let result = match op.kind() {
            ChangeOperation::Insert => {
               let key_value = live_key.to_column_value();
               let mut columns: Vec<&str> = Vec::with_capacity(op.values().len() + 1);
               if key_value.is_some() {
                  columns.push(self.key_column.as_str());
               }
               columns.extend(op.values().keys().map(String::as_str));

               let placeholders = vec!["?"; columns.len()].join(", ");
               let sql = format!(
                  "INSERT INTO \"{table}\" ({}) VALUES ({placeholders})",
                  quoted(&columns)
               );

               let mut query = sqlx::query(&sql);
               if let Some(key_value) = &key_value {
                  query = bind_value(query, key_value);
               }
               for value in op.values().values() {
                  query = bind_value(query, value);
               }

               let result = query
                  .execute(&mut *conn)
                  .await
                  .map_err(Error::CommitFailed)?;

               if live_key.is_server_generated() && !live_key.is_assigned() {
                  op.entity().assign_generated_key(result.last_insert_rowid());
                  trace!(
                     table = %table,
                     rowid = result.last_insert_rowid(),
                     "Assigned server-generated key"
                  );
               }

               result
            }

            ChangeOperation::Update => {
               let key_value = keyed(&live_key, op.kind(), table)?;
               let assignments = op
                  .values()
                  .keys()
                  .map(|column| format!("\"{column}\" = ?"))
                  .collect::<Vec<_>>()
                  .join(", ");
               let sql = format!(
                  "UPDATE \"{table}\" SET {assignments} WHERE \"{}\" = ?",
                  self.key_column
               );

               let mut query = sqlx::query(&sql);
               for value in op.values().values() {
                  query = bind_value(query, value);
               }
               query = bind_value(query, &key_value);

               query
                  .execute(&mut *conn)
                  .await
                  .map_err(Error::CommitFailed)?
            }

            ChangeOperation::Delete => {
               let key_value = keyed(&live_key, op.kind(), table)?;
               let sql = format!("DELETE FROM \"{table}\" WHERE \"{}\" = ?", self.key_column);

               let query = bind_value(sqlx::query(&sql), &key_value);
               query
                  .execute(&mut *conn)
                  .await
                  .map_err(Error::CommitFailed)?
            }
         };

         rows_affected += result.rows_affected();
      }

      Ok(rows_affected)
   }
}

#[async_trait]
impl ExecutionEngine for SqliteExecutionEngine {
   async fn execute(&self, endpoint: &SqliteEndpoint, change_set: &ChangeSet) -> Result<u64> {
      if change_set.is_empty() {
         return Ok(0);
      }

      let mut writer = endpoint.acquire_writer().await?;

      sqlx::query("BEGIN IMMEDIATE")
         .execute(&mut *writer)
         .await
         .map_err(Error::CommitFailed)?;

      match self.execute_ops(&mut writer, change_set).await {
         Ok(rows_affected) => {
            sqlx::query("COMMIT")
               .execute(&mut *writer)
               .await
               .map_err(Error::CommitFailed)?;

            for op in change_set.ops() {
               op.entity().mark_committed();
            }

            debug!(
               endpoint = %endpoint.descriptor(),
               change_set = %change_set.id(),
               rows_affected,
               "Executed change set"
            );

            Ok(rows_affected)
         }
         Err(e) => {
            if let Err(rollback_err) = sqlx::query("ROLLBACK").execute(&mut *writer).await {
               error!(
                  endpoint = %endpoint.descriptor(),
                  change_set = %change_set.id(),
                  "Rollback after failed change set also failed: {rollback_err}"
               );
            }
            Err(e)
         }
      }
   }
}

fn quoted(columns: &[&str]) -> String {
   columns
      .iter()
      .map(|c| format!("\"{c}\""))
      .collect::<Vec<_>>()
      .join(", ")
}

fn keyed(
   key: &sqlx_sqlite_changeset::EntityKey,
   kind: ChangeOperation,
   table: &str,
) -> Result<ColumnValue> {
   key.to_column_value().ok_or_else(|| {
      Error::ChangeSet(sqlx_sqlite_changeset::Error::UnkeyedOperation {
         operation: kind.verb(),
         table: table.to_string(),
      })
   })
}

fn bind_value<'q>(
   query: sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>>,
   value: &ColumnValue,
) -> sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>> {
   match value {
      ColumnValue::Null => query.bind(None::<i64>),
      ColumnValue::Integer(i) => query.bind(*i),
      ColumnValue::Real(r) => query.bind(*r),
      ColumnValue::Text(s) => query.bind(s.clone()),
      ColumnValue::Blob(b) => query.bind(b.clone()),
   }
}
