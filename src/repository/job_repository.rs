use chrono::Utc;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::cron;
use crate::domain::{Job, JobType};
use crate::errors::AppError;
use crate::pagination::ValidatedPagination;
use crate::store;

/// Filter fields accepted by `findAll`. `search` is matched case-insensitively
/// against `name`; `tags` is an array-overlap match.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobFilter {
    pub is_active: Option<bool>,
    pub job_type: Option<JobType>,
    pub tags: Vec<String>,
    pub search: Option<String>,
}

/// Fields accepted by `update`. Anything `None` is left unchanged.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub cron_expression: Option<String>,
    pub is_active: Option<bool>,
    pub job_type: Option<JobType>,
    pub payload: Option<serde_json::Value>,
    pub timeout_ms: Option<i32>,
    pub max_retries: Option<i32>,
    pub retry_delay_ms: Option<i32>,
    pub tags: Option<Vec<String>>,
}

pub struct JobRepository {
    pool: PgPool,
}

impl JobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_all(
        &self,
        pagination: ValidatedPagination,
        filter: &JobFilter,
    ) -> Result<(Vec<Job>, i64), AppError> {
        let search_pattern = filter.search.as_ref().map(|s| format!("%{s}%"));

        let count_query = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM jobs
            WHERE ($1::bool IS NULL OR is_active = $1)
              AND ($2::job_type IS NULL OR job_type = $2)
              AND ($3::text[] IS NULL OR tags && $3)
              AND ($4::text IS NULL OR name ILIKE $4)
            "#,
        )
        .bind(filter.is_active)
        .bind(&filter.job_type)
        .bind(if filter.tags.is_empty() { None } else { Some(filter.tags.as_slice()) })
        .bind(&search_pattern)
        .fetch_one(&self.pool);
        let total: i64 = store::timed("jobs.find_all.count", count_query).await?;

        let list_query = sqlx::query_as::<_, Job>(
            r#"
            SELECT * FROM jobs
            WHERE ($1::bool IS NULL OR is_active = $1)
              AND ($2::job_type IS NULL OR job_type = $2)
              AND ($3::text[] IS NULL OR tags && $3)
              AND ($4::text IS NULL OR name ILIKE $4)
            ORDER BY created_at DESC
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(filter.is_active)
        .bind(&filter.job_type)
        .bind(if filter.tags.is_empty() { None } else { Some(filter.tags.as_slice()) })
        .bind(&search_pattern)
        .bind(pagination.limit)
        .bind(pagination.offset())
        .fetch_all(&self.pool);
        let rows = store::timed("jobs.find_all.rows", list_query).await?;

        Ok((rows, total))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Job>, AppError> {
        let query = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool);
        let job = store::timed("jobs.find_by_id", query).await?;
        Ok(job)
    }

    pub async fn create(&self, mut job: Job) -> Result<Job, AppError> {
        Job::validate_fields(
            &job.name,
            job.description.as_deref(),
            &job.cron_expression,
            job.timeout_ms,
            job.max_retries,
            job.retry_delay_ms,
            job.created_by.as_deref(),
            &job.tags,
        )?;

        job.next_run_at = if job.is_active {
            Some(cron::next_after(&job.cron_expression, Utc::now()))
        } else {
            None
        };

        let query = sqlx::query_as::<_, Job>(
            r#"
            INSERT INTO jobs (
                id, name, description, cron_expression, is_active, job_type, payload,
                timeout_ms, max_retries, retry_delay_ms, created_by, tags,
                created_at, updated_at, last_run_at, next_run_at,
                total_runs, successful_runs, failed_runs
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19
            )
            RETURNING *
            "#,
        )
        .bind(job.id)
        .bind(&job.name)
        .bind(&job.description)
        .bind(&job.cron_expression)
        .bind(job.is_active)
        .bind(&job.job_type)
        .bind(&job.payload)
        .bind(job.timeout_ms)
        .bind(job.max_retries)
        .bind(job.retry_delay_ms)
        .bind(&job.created_by)
        .bind(&job.tags)
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.last_run_at)
        .bind(job.next_run_at)
        .bind(job.total_runs)
        .bind(job.successful_runs)
        .bind(job.failed_runs)
        .fetch_one(&self.pool);
        let row = store::timed("jobs.create", query).await?;

        Ok(row)
    }

    pub async fn update(&self, id: Uuid, patch: JobPatch) -> Result<Option<Job>, AppError> {
        let Some(mut job) = self.find_by_id(id).await? else {
            return Ok(None);
        };

        let cron_changed = patch
            .cron_expression
            .as_ref()
            .is_some_and(|c| *c != job.cron_expression);

        if let Some(name) = patch.name {
            job.name = name;
        }
        if let Some(description) = patch.description {
            job.description = description;
        }
        if let Some(cron_expression) = patch.cron_expression {
            job.cron_expression = cron_expression;
        }
        if let Some(is_active) = patch.is_active {
            job.is_active = is_active;
        }
        if let Some(job_type) = patch.job_type {
            job.job_type = job_type;
        }
        if let Some(payload) = patch.payload {
            job.payload = payload;
        }
        if let Some(timeout_ms) = patch.timeout_ms {
            job.timeout_ms = timeout_ms;
        }
        if let Some(max_retries) = patch.max_retries {
            job.max_retries = max_retries;
        }
        if let Some(retry_delay_ms) = patch.retry_delay_ms {
            job.retry_delay_ms = retry_delay_ms;
        }
        if let Some(tags) = patch.tags {
            job.tags = tags;
        }

        Job::validate_fields(
            &job.name,
            job.description.as_deref(),
            &job.cron_expression,
            job.timeout_ms,
            job.max_retries,
            job.retry_delay_ms,
            job.created_by.as_deref(),
            &job.tags,
        )?;

        // An active job always carries a next_run_at (§3 invariant): recompute
        // it whenever the cron changed or it's missing (e.g. an
        // inactive->active transition with no cron change left it null).
        // An inactive job never has one.
        if job.is_active {
            if cron_changed || job.next_run_at.is_none() {
                job.next_run_at = Some(cron::next_after(&job.cron_expression, Utc::now()));
            }
        } else {
            job.next_run_at = None;
        }
        job.updated_at = Utc::now();

        let query = sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs SET
                name = $2, description = $3, cron_expression = $4, is_active = $5,
                job_type = $6, payload = $7, timeout_ms = $8, max_retries = $9,
                retry_delay_ms = $10, tags = $11, updated_at = $12, next_run_at = $13
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(job.id)
        .bind(&job.name)
        .bind(&job.description)
        .bind(&job.cron_expression)
        .bind(job.is_active)
        .bind(&job.job_type)
        .bind(&job.payload)
        .bind(job.timeout_ms)
        .bind(job.max_retries)
        .bind(job.retry_delay_ms)
        .bind(&job.tags)
        .bind(job.updated_at)
        .bind(job.next_run_at)
        .fetch_one(&self.pool);
        let row = store::timed("jobs.update", query).await?;

        Ok(Some(row))
    }

    pub async fn delete(&self, id: Uuid) -> Result<Option<Job>, AppError> {
        let query = sqlx::query_as::<_, Job>("DELETE FROM jobs WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(&self.pool);
        let row = store::timed("jobs.delete", query).await?;
        Ok(row)
    }

    /// Atomically increments `total_runs` and either `successful_runs` or
    /// `failed_runs`, and sets `last_run_at`. A single `UPDATE` round trip
    /// keeps the counters coherent even under concurrent terminations.
    pub async fn update_job_stats(&self, id: Uuid, success: bool) -> Result<(), AppError> {
        let query = sqlx::query(
            r#"
            UPDATE jobs SET
                total_runs = total_runs + 1,
                successful_runs = successful_runs + CASE WHEN $2 THEN 1 ELSE 0 END,
                failed_runs = failed_runs + CASE WHEN $2 THEN 0 ELSE 1 END,
                last_run_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(success)
        .execute(&self.pool);
        store::timed("jobs.update_job_stats", query).await?;
        Ok(())
    }

    pub async fn set_next_run_at(&self, id: Uuid, next_run_at: chrono::DateTime<Utc>) -> Result<(), AppError> {
        let query = sqlx::query("UPDATE jobs SET next_run_at = $2 WHERE id = $1")
            .bind(id)
            .bind(next_run_at)
            .execute(&self.pool);
        store::timed("jobs.set_next_run_at", query).await?;
        Ok(())
    }

    /// All active jobs whose `next_run_at` is due. Used on scheduler
    /// startup; the periodic resync instead diffs on `is_active` alone.
    pub async fn get_active_jobs(&self) -> Result<Vec<Job>, AppError> {
        let query = sqlx::query_as::<_, Job>(
            r#"
            SELECT * FROM jobs
            WHERE is_active AND (next_run_at IS NULL OR next_run_at <= NOW())
            ORDER BY next_run_at ASC
            LIMIT 1000
            "#,
        )
        .fetch_all(&self.pool);
        let rows = store::timed("jobs.get_active_jobs", query).await?;
        Ok(rows)
    }

    /// All jobs with `is_active = true`, regardless of `next_run_at`. This
    /// is the set the scheduler's periodic resync diffs `active` against,
    /// per the redesigned resync policy.
    pub async fn get_all_active(&self) -> Result<Vec<Job>, AppError> {
        let query = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE is_active").fetch_all(&self.pool);
        let rows = store::timed("jobs.get_all_active", query).await?;
        Ok(rows)
    }

    pub async fn count_total(&self) -> Result<i64, AppError> {
        let query = sqlx::query_scalar("SELECT COUNT(*) FROM jobs").fetch_one(&self.pool);
        let count: i64 = store::timed("jobs.count_total", query).await?;
        Ok(count)
    }

    pub async fn count_active(&self) -> Result<i64, AppError> {
        let query = sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE is_active").fetch_one(&self.pool);
        let count: i64 = store::timed("jobs.count_active", query).await?;
        Ok(count)
    }

    /// Job counts grouped by `job_type`, keyed by the enum's wire name.
    pub async fn count_by_job_type(&self) -> Result<Vec<(JobType, i64)>, AppError> {
        let query = sqlx::query_as("SELECT job_type, COUNT(*) FROM jobs GROUP BY job_type").fetch_all(&self.pool);
        let rows: Vec<(JobType, i64)> = store::timed("jobs.count_by_job_type", query).await?;
        Ok(rows)
    }
}
