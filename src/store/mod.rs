//! Thin wrapper around the connection pool: health checks and slow-query
//! reporting. `JobRepository` and `ExecutionRepository` hold a `PgPool`
//! directly for their queries and call [`timed`] around each round trip so
//! every statement is eligible for the same slow-query warning, regardless
//! of which repository issued it.

use std::future::Future;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

/// Any single statement taking longer than this is surfaced as a warning.
pub const SLOW_QUERY_THRESHOLD: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub healthy: bool,
    #[serde(rename = "latencyMs")]
    pub latency_ms: u128,
}

/// Runs `fut`, timing it, and emits a `tracing::warn!` if it exceeds
/// [`SLOW_QUERY_THRESHOLD`]. `label` should name the statement (e.g.
/// `"jobs.find_all"`), never bound parameter values.
pub async fn timed<F, T>(label: &'static str, fut: F) -> T
where
    F: Future<Output = T>,
{
    let start = Instant::now();
    let result = fut.await;
    let elapsed = start.elapsed();
    if elapsed > SLOW_QUERY_THRESHOLD {
        tracing::warn!(statement = label, elapsed_ms = elapsed.as_millis(), "slow query");
    }
    result
}

/// Ensures the monthly partition of `job_executions` covering `for_instant`
/// exists, creating it if not (see `ensure_execution_partition` in
/// `migrations/0001_init.sql`). Called before every execution insert so a
/// month boundary never blocks a write; the table's `DEFAULT` partition is
/// the backstop if this call is ever skipped or races a concurrent creator.
pub async fn ensure_execution_partition(pool: &PgPool, for_instant: DateTime<Utc>) -> Result<(), sqlx::Error> {
    let query = sqlx::query("SELECT ensure_execution_partition($1::date)")
        .bind(for_instant.date_naive())
        .execute(pool);
    timed("store.ensure_execution_partition", query).await?;
    Ok(())
}

/// A 5-second bounded `SELECT 1` used by `GET /health`.
pub async fn health_check(pool: &PgPool) -> HealthStatus {
    let start = Instant::now();
    let healthy = tokio::time::timeout(Duration::from_secs(5), sqlx::query("SELECT 1").execute(pool))
        .await
        .map(|r| r.is_ok())
        .unwrap_or(false);
    HealthStatus { healthy, latency_ms: start.elapsed().as_millis() }
}
