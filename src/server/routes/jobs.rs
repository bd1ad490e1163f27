//! CRUD, trigger, and cron-validation handlers for `/jobs`.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cron;
use crate::domain::{Job, JobType};
use crate::errors::{AppError, AppResult, FieldError};
use crate::pagination::{PageInfo, PaginationParams};
use crate::repository::{JobFilter, JobPatch};
use crate::server::app::AppState;

const JOB_DETAIL_TTL: std::time::Duration = std::time::Duration::from_secs(600);
const JOB_LIST_TTL: std::time::Duration = std::time::Duration::from_secs(120);
const EXECUTION_HISTORY_PREVIEW_LIMIT: i64 = 20;

fn parse_job_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::single_field("id", "id must be a valid UUID"))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    #[serde(rename = "isActive")]
    pub is_active: Option<bool>,
    #[serde(rename = "jobType")]
    pub job_type: Option<JobType>,
    pub tags: Option<String>,
    pub search: Option<String>,
    pub fresh: Option<bool>,
}

#[derive(Debug, Serialize)]
struct Envelope<T> {
    success: bool,
    data: T,
    timestamp: chrono::DateTime<Utc>,
}

impl<T> Envelope<T> {
    fn ok(data: T) -> Self {
        Self { success: true, data, timestamp: Utc::now() }
    }
}

#[derive(Debug, Serialize)]
struct JobListData {
    jobs: Vec<Job>,
    pagination: PageInfo,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Envelope<JobListData>>> {
    let pagination = PaginationParams { page: query.page, limit: query.limit }.validate()?;

    if let Some(search) = &query.search {
        if search.len() > 255 {
            return Err(AppError::single_field("search", "search must be at most 255 characters"));
        }
    }

    let filter = JobFilter {
        is_active: query.is_active,
        job_type: query.job_type,
        tags: query
            .tags
            .map(|t| t.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default(),
        search: query.search.clone(),
    };

    let cache_key = canonical_list_cache_key(pagination.page, pagination.limit, &filter);
    let fresh = query.fresh.unwrap_or(false);

    let (mut jobs, total) = if !fresh {
        if let Some(cached) = state.cache.get(&cache_key) {
            let jobs: Vec<Job> = serde_json::from_value(cached["jobs"].clone()).unwrap_or_default();
            let total = cached["total"].as_i64().unwrap_or(0);
            (jobs, total)
        } else {
            let (jobs, total) = state.repository.find_all(pagination, &filter).await?;
            state.cache.set(
                &cache_key,
                serde_json::json!({ "jobs": jobs, "total": total }),
                JOB_LIST_TTL,
            );
            (jobs, total)
        }
    } else {
        state.repository.find_all(pagination, &filter).await?
    };

    // Overlay fresh last_run_at/next_run_at/stats for active jobs even on a cache hit.
    for job in jobs.iter_mut().filter(|j| j.is_active) {
        if let Some(fresh_job) = state.repository.find_by_id(job.id).await? {
            job.last_run_at = fresh_job.last_run_at;
            job.next_run_at = fresh_job.next_run_at;
            job.total_runs = fresh_job.total_runs;
            job.successful_runs = fresh_job.successful_runs;
            job.failed_runs = fresh_job.failed_runs;
        }
    }

    let pagination_info = PageInfo::build(pagination, total);
    Ok(Json(Envelope::ok(JobListData { jobs, pagination: pagination_info })))
}

/// Builds the `jobs:<canonical-json(filter)>` cache key. Field order is
/// fixed so the same logical filter always produces the same string.
fn canonical_list_cache_key(page: i64, limit: i64, filter: &JobFilter) -> String {
    let mut tags = filter.tags.clone();
    tags.sort();
    format!(
        "jobs:{}",
        serde_json::json!({
            "page": page,
            "limit": limit,
            "isActive": filter.is_active,
            "jobType": filter.job_type,
            "tags": tags,
            "search": filter.search,
        })
    )
}

#[derive(Debug, Serialize)]
struct JobDetailData {
    job: Job,
    #[serde(rename = "executionHistory")]
    execution_history: Vec<crate::domain::JobExecution>,
    #[serde(rename = "isScheduled")]
    is_scheduled: bool,
}

pub async fn get_one(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Envelope<JobDetailData>>> {
    let id = parse_job_id(&id)?;
    let cache_key = format!("job:{id}");

    let job = if let Some(cached) = state.cache.get(&cache_key) {
        serde_json::from_value(cached).map_err(|e| AppError::Unknown(e.into()))?
    } else {
        let job = state
            .repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("job {id}")))?;
        state.cache.set(&cache_key, serde_json::json!(job), JOB_DETAIL_TTL);
        job
    };

    let execution_history = state.executions.recent_count_for_job(id, EXECUTION_HISTORY_PREVIEW_LIMIT).await?;
    let is_scheduled = state.scheduler.is_scheduled(id).await;

    Ok(Json(Envelope::ok(JobDetailData { job, execution_history, is_scheduled })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    pub name: String,
    pub description: Option<String>,
    pub cron_expression: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub job_type: JobType,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: i32,
    #[serde(default = "default_max_retries")]
    pub max_retries: i32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: i32,
    pub created_by: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_true() -> bool {
    true
}
fn default_timeout_ms() -> i32 {
    30_000
}
fn default_max_retries() -> i32 {
    3
}
fn default_retry_delay_ms() -> i32 {
    5_000
}

pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreateJobRequest>,
) -> AppResult<(StatusCode, Json<Envelope<Job>>)> {
    Job::validate_fields(
        &req.name,
        req.description.as_deref(),
        &req.cron_expression,
        req.timeout_ms,
        req.max_retries,
        req.retry_delay_ms,
        req.created_by.as_deref(),
        &req.tags,
    )?;

    let job = Job::builder()
        .name(req.name)
        .description(req.description)
        .cron_expression(req.cron_expression)
        .is_active(req.is_active)
        .job_type(req.job_type)
        .payload(req.payload)
        .timeout_ms(req.timeout_ms)
        .max_retries(req.max_retries)
        .retry_delay_ms(req.retry_delay_ms)
        .created_by(req.created_by)
        .tags(req.tags)
        .build();

    let created = state.repository.create(job).await?;

    if created.is_active {
        state.scheduler.schedule_job(created.clone()).await;
    }
    state.cache.delete_prefixed("jobs:");

    Ok((StatusCode::CREATED, Json(Envelope::ok(created))))
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateJobRequest {
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

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateJobRequest>,
) -> AppResult<Json<Envelope<Job>>> {
    let id = parse_job_id(&id)?;

    let patch = JobPatch {
        name: req.name,
        description: req.description,
        cron_expression: req.cron_expression,
        is_active: req.is_active,
        job_type: req.job_type,
        payload: req.payload,
        timeout_ms: req.timeout_ms,
        max_retries: req.max_retries,
        retry_delay_ms: req.retry_delay_ms,
        tags: req.tags,
    };

    let updated = state
        .repository
        .update(id, patch)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("job {id}")))?;

    if updated.is_active {
        state.scheduler.schedule_job(updated.clone()).await;
    } else {
        state.scheduler.unschedule_job(id).await;
    }
    state.cache.delete(&format!("job:{id}"));
    state.cache.delete_prefixed("jobs:");

    Ok(Json(Envelope::ok(updated)))
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Envelope<Job>>> {
    let id = parse_job_id(&id)?;

    let deleted = state
        .repository
        .delete(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("job {id}")))?;

    state.scheduler.unschedule_job(id).await;
    state.cache.delete(&format!("job:{id}"));
    state.cache.delete_prefixed("jobs:");

    Ok(Json(Envelope::ok(deleted)))
}

#[derive(Debug, Serialize)]
struct TriggerResponse {
    #[serde(rename = "jobId")]
    job_id: Uuid,
    #[serde(rename = "jobName")]
    job_name: String,
    #[serde(rename = "triggeredAt")]
    triggered_at: chrono::DateTime<Utc>,
}

pub async fn trigger(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Envelope<TriggerResponse>>> {
    let id = parse_job_id(&id)?;
    let job = state
        .repository
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("job {id}")))?;

    let scheduler = Arc::clone(&state.scheduler);
    tokio::spawn(async move {
        scheduler.execute_job(id).await;
    });

    Ok(Json(Envelope::ok(TriggerResponse {
        job_id: id,
        job_name: job.name,
        triggered_at: Utc::now(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct ValidateCronRequest {
    #[serde(rename = "cronExpression")]
    pub cron_expression: String,
}

#[derive(Debug, Serialize)]
struct ValidateCronResponse {
    #[serde(rename = "isValid")]
    is_valid: bool,
    expression: String,
    #[serde(rename = "nextRuns")]
    next_runs: Vec<chrono::DateTime<Utc>>,
    timezone: &'static str,
}

pub async fn validate_cron(Json(req): Json<ValidateCronRequest>) -> AppResult<Json<Envelope<ValidateCronResponse>>> {
    let is_valid = cron::validate(&req.cron_expression);
    if !is_valid {
        return Err(AppError::validation(vec![FieldError::new(
            "cronExpression",
            "cronExpression must be a valid 5-field cron expression",
        )]));
    }

    let mut next_runs = Vec::with_capacity(5);
    let mut cursor = Utc::now();
    for _ in 0..5 {
        cursor = cron::next_after(&req.cron_expression, cursor);
        next_runs.push(cursor);
        cursor += chrono::Duration::seconds(1);
    }

    Ok(Json(Envelope::ok(ValidateCronResponse {
        is_valid,
        expression: req.cron_expression,
        next_runs,
        timezone: "Asia/Kolkata",
    })))
}
