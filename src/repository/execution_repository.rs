use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{ExecutionStatus, JobExecution};
use crate::errors::AppError;
use crate::pagination::ValidatedPagination;
use crate::store;

pub struct ExecutionRepository {
    pool: PgPool,
}

impl ExecutionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a provisional `running` execution row and returns it.
    pub async fn start(&self, job_id: Uuid) -> Result<JobExecution, AppError> {
        let execution = JobExecution::builder().job_id(job_id).build();

        // Guarantees the month's partition exists before the insert below;
        // the table's DEFAULT partition catches the row if this races or
        // fails, so a transient error here never blocks the write.
        if let Err(err) = store::ensure_execution_partition(&self.pool, execution.started_at).await {
            tracing::warn!(job_id = %job_id, error = %err, "failed to ensure execution partition, relying on default partition");
        }

        let query = sqlx::query_as::<_, JobExecution>(
            r#"
            INSERT INTO job_executions (id, job_id, status, started_at, retry_count)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(execution.id)
        .bind(execution.job_id)
        .bind(execution.status)
        .bind(execution.started_at)
        .bind(execution.retry_count)
        .fetch_one(&self.pool);
        let row = store::timed("executions.start", query).await?;
        Ok(row)
    }

    /// Marks an execution terminal. `status` must not be `Running`.
    pub async fn complete(
        &self,
        id: Uuid,
        started_at: DateTime<Utc>,
        status: ExecutionStatus,
        error_message: Option<String>,
        output: Option<serde_json::Value>,
    ) -> Result<(), AppError> {
        let completed_at = Utc::now();
        let duration_ms = (completed_at - started_at).num_milliseconds();

        let query = sqlx::query(
            r#"
            UPDATE job_executions SET
                status = $3, completed_at = $4, duration_ms = $5,
                error_message = $6, output = $7
            WHERE id = $1 AND started_at = $2
            "#,
        )
        .bind(id)
        .bind(started_at)
        .bind(status)
        .bind(completed_at)
        .bind(duration_ms)
        .bind(error_message)
        .bind(output)
        .execute(&self.pool);
        store::timed("executions.complete", query).await?;
        Ok(())
    }

    pub async fn find_for_job(
        &self,
        job_id: Uuid,
        pagination: ValidatedPagination,
    ) -> Result<(Vec<JobExecution>, i64), AppError> {
        let count_query = sqlx::query_scalar("SELECT COUNT(*) FROM job_executions WHERE job_id = $1")
            .bind(job_id)
            .fetch_one(&self.pool);
        let total: i64 = store::timed("executions.find_for_job.count", count_query).await?;

        let list_query = sqlx::query_as::<_, JobExecution>(
            r#"
            SELECT * FROM job_executions
            WHERE job_id = $1
            ORDER BY started_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(job_id)
        .bind(pagination.limit)
        .bind(pagination.offset())
        .fetch_all(&self.pool);
        let rows = store::timed("executions.find_for_job.rows", list_query).await?;

        Ok((rows, total))
    }

    pub async fn recent_count_for_job(&self, job_id: Uuid, limit: i64) -> Result<Vec<JobExecution>, AppError> {
        let query = sqlx::query_as::<_, JobExecution>(
            r#"
            SELECT * FROM job_executions
            WHERE job_id = $1
            ORDER BY started_at DESC
            LIMIT $2
            "#,
        )
        .bind(job_id)
        .bind(limit)
        .fetch_all(&self.pool);
        let rows = store::timed("executions.recent_count_for_job", query).await?;
        Ok(rows)
    }

    pub async fn count_recent_24h(&self) -> Result<i64, AppError> {
        let query = sqlx::query_scalar(
            "SELECT COUNT(*) FROM job_executions WHERE started_at >= NOW() - INTERVAL '24 hours'",
        )
        .fetch_one(&self.pool);
        let count: i64 = store::timed("executions.count_recent_24h", query).await?;
        Ok(count)
    }

    pub async fn count_total(&self) -> Result<i64, AppError> {
        let query = sqlx::query_scalar("SELECT COUNT(*) FROM job_executions").fetch_one(&self.pool);
        let count: i64 = store::timed("executions.count_total", query).await?;
        Ok(count)
    }
}
