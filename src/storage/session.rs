//! One transaction-scoped unit of work.

use crate::error::AppError;
use crate::sql::{bind_all, row_to_json, QueryResult};
use serde_json::Value;
use sqlx::{Any, Transaction};

/// A session wraps one open transaction. Execute statements through it, then
/// [`Session::commit`] or [`Session::rollback`] to finish the unit of work.
pub struct Session {
    tx: Transaction<'static, Any>,
}

impl Session {
    pub(crate) fn new(tx: Transaction<'static, Any>) -> Session {
        Session { tx }
    }

    /// Run a DML statement and report affected rows.
    pub async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult, AppError> {
        tracing::debug!(sql = %sql, params = ?params, "execute");
        let done = bind_all(sqlx::query(sql), params)
            .execute(&mut *self.tx)
            .await?;
        Ok(QueryResult::from_count(done.rows_affected()))
    }

    /// Run a SELECT and decode every row.
    pub async fn query(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult, AppError> {
        tracing::debug!(sql = %sql, params = ?params, "query");
        let rows = bind_all(sqlx::query(sql), params)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(QueryResult::from_rows(rows.iter().map(row_to_json).collect()))
    }

    pub async fn commit(self) -> Result<(), AppError> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), AppError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
