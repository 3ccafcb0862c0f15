//! Remote operation client backed by a `PostgreSQL` pool.
//!
//! # Design
//! - Statements are wrapped in `SELECT to_jsonb(r) FROM (...) r` so any result shape
//!   comes back as a loosely typed [`Record`].
//! - `exec` and `exec_script` run inside a transaction; the transaction rolls back on error.
//! - Dropped connections are retried a bounded number of times before the error surfaces.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgConnection, PgPoolOptions};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{debug, error, warn};

use crate::error::{DataError, DataResult, map_query_err};
use crate::record::{Param, Record};

/// Additional attempts granted to an operation that failed with a connection reset.
pub const MAX_TRANSIENT_RETRIES: u32 = 2;

/// Execute named operations and queries against the remote data engine.
#[async_trait]
pub trait RemoteOperations: Send + Sync {
    /// Run a statement inside a transaction and return its rows.
    async fn exec(&self, text: &str, params: &[Param]) -> DataResult<Vec<Record>>;

    /// Run a read-only statement; `limit` of zero returns every row.
    async fn query(&self, text: &str, limit: usize, params: &[Param]) -> DataResult<Vec<Record>>;

    /// Submit a multi-statement script verbatim inside a transaction.
    async fn exec_script(&self, text: &str) -> DataResult<()>;
}

/// [`RemoteOperations`] over a `sqlx` Postgres pool.
#[derive(Clone)]
pub struct PgOperations {
    pool: PgPool,
}

impl PgOperations {
    /// Connect a pool to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::Connect`] when the database is unreachable or the
    /// credentials are rejected.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> DataResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await
            .map_err(|source| DataError::Connect { source })?;
        Ok(Self { pool })
    }

    async fn exec_once(&self, text: &str, params: &[Param]) -> DataResult<Vec<Record>> {
        let mut tx = self.pool.begin().await.map_err(map_query_err("begin"))?;
        match fetch_records(&mut tx, "exec", text, 0, params).await {
            Ok(records) => {
                tx.commit().await.map_err(map_query_err("commit"))?;
                Ok(records)
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "transaction rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn query_once(
        &self,
        text: &str,
        limit: usize,
        params: &[Param],
    ) -> DataResult<Vec<Record>> {
        let mut conn = self.pool.acquire().await.map_err(map_query_err("acquire"))?;
        fetch_records(&mut conn, "query", text, limit, params).await
    }

    async fn script_once(&self, text: &str) -> DataResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_query_err("begin"))?;
        match sqlx::Executor::execute(&mut *tx, sqlx::raw_sql(text)).await {
            Ok(_) => tx.commit().await.map_err(map_query_err("commit")),
            Err(source) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "transaction rollback failed");
                }
                Err(DataError::QueryFailed {
                    operation: "exec_script",
                    source,
                })
            }
        }
    }
}

#[async_trait]
impl RemoteOperations for PgOperations {
    async fn exec(&self, text: &str, params: &[Param]) -> DataResult<Vec<Record>> {
        with_transient_retry("exec", || self.exec_once(text, params)).await
    }

    async fn query(&self, text: &str, limit: usize, params: &[Param]) -> DataResult<Vec<Record>> {
        with_transient_retry("query", || self.query_once(text, limit, params)).await
    }

    async fn exec_script(&self, text: &str) -> DataResult<()> {
        with_transient_retry("exec_script", || self.script_once(text)).await
    }
}

/// Run `attempt`, retrying up to [`MAX_TRANSIENT_RETRIES`] extra times on a connection reset.
pub(crate) async fn with_transient_retry<F, Fut, T>(
    operation: &'static str,
    mut attempt: F,
) -> DataResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DataResult<T>>,
{
    let mut retries = 0;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && retries < MAX_TRANSIENT_RETRIES => {
                retries += 1;
                warn!(operation, retries, "connection reset; retrying");
            }
            Err(err) => {
                error!(operation, error = %err, "remote operation failed");
                return Err(err);
            }
        }
    }
}

async fn fetch_records(
    conn: &mut PgConnection,
    operation: &'static str,
    text: &str,
    limit: usize,
    params: &[Param],
) -> DataResult<Vec<Record>> {
    let sql = wrap_statement(text, limit);
    debug!(operation, args = params.len(), "executing remote operation");

    let mut query = sqlx::query_scalar::<_, Json<Value>>(&sql);
    for param in params {
        query = match param {
            Param::Text(value) => query.bind(value.clone()),
            Param::Int(value) => query.bind(*value),
            Param::Null => query.bind(Option::<String>::None),
        };
    }

    let rows = query
        .fetch_all(&mut *conn)
        .await
        .map_err(map_query_err(operation))?;
    rows.into_iter()
        .map(|Json(value)| Record::from_json(value).ok_or(DataError::UnexpectedRow { operation }))
        .collect()
}

fn wrap_statement(text: &str, limit: usize) -> String {
    let statement = text.trim().trim_end_matches(';');
    if limit > 0 {
        format!("SELECT to_jsonb(r) FROM ({statement}) r LIMIT {limit}")
    } else {
        format!("SELECT to_jsonb(r) FROM ({statement}) r")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn reset() -> DataError {
        DataError::QueryFailed {
            operation: "query",
            source: sqlx::Error::Io(io::Error::from(io::ErrorKind::ConnectionReset)),
        }
    }

    #[test]
    fn wrap_statement_strips_terminator_and_applies_limit() {
        assert_eq!(
            wrap_statement("SELECT * FROM meta.delivery_validate($1);", 0),
            "SELECT to_jsonb(r) FROM (SELECT * FROM meta.delivery_validate($1)) r"
        );
        assert_eq!(
            wrap_statement(" SELECT 1 AS one ", 5),
            "SELECT to_jsonb(r) FROM (SELECT 1 AS one) r LIMIT 5"
        );
    }

    #[tokio::test]
    async fn transient_errors_are_retried_twice() {
        let calls = AtomicU32::new(0);
        let result: DataResult<()> = with_transient_retry("query", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(reset()) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1 + MAX_TRANSIENT_RETRIES);
    }

    #[tokio::test]
    async fn retry_stops_once_the_operation_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_transient_retry("exec", || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move { if attempt == 0 { Err(reset()) } else { Ok(attempt) } }
        })
        .await;
        assert_eq!(result.ok(), Some(1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: DataResult<()> = with_transient_retry("exec", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(DataError::QueryFailed {
                    operation: "exec",
                    source: sqlx::Error::RowNotFound,
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
