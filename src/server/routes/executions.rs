//! `GET /jobs/:id/executions` — paginated execution history for a job.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::domain::JobExecution;
use crate::errors::{AppError, AppResult};
use crate::pagination::{PageInfo, PaginationParams};
use crate::server::app::AppState;

const DEFAULT_LIMIT: i64 = 20;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
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
struct ExecutionListData {
    executions: Vec<JobExecution>,
    pagination: PageInfo,
}

pub async fn list(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Envelope<ExecutionListData>>> {
    let job_id = uuid::Uuid::parse_str(&id).map_err(|_| AppError::single_field("id", "id must be a valid UUID"))?;

    let pagination = PaginationParams {
        page: query.page,
        limit: Some(query.limit.unwrap_or(DEFAULT_LIMIT)),
    }
    .validate()?;

    let (executions, total) = state.executions.find_for_job(job_id, pagination).await?;
    let pagination_info = PageInfo::build(pagination, total);

    Ok(Json(Envelope::ok(ExecutionListData { executions, pagination: pagination_info })))
}
