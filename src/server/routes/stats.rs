//! `GET /jobs/stats` — scheduler, cache, and aggregated database statistics.

use std::collections::HashMap;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::cache::CacheStats;
use crate::domain::JobType;
use crate::errors::AppResult;
use crate::scheduler::SchedulerStatsView;
use crate::server::app::AppState;

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
struct DatabaseStats {
    #[serde(rename = "totalJobs")]
    total_jobs: i64,
    #[serde(rename = "activeJobs")]
    active_jobs: i64,
    #[serde(rename = "totalExecutions")]
    total_executions: i64,
    #[serde(rename = "recentExecutions")]
    recent_executions: i64,
    #[serde(rename = "jobsByType")]
    jobs_by_type: HashMap<JobType, i64>,
}

#[derive(Debug, Serialize)]
struct StatsData {
    scheduler: SchedulerStatsView,
    cache: CacheStats,
    database: DatabaseStats,
}

pub async fn handler(State(state): State<AppState>) -> AppResult<Json<Envelope<StatsData>>> {
    let scheduler = state.scheduler.stats().await;
    let cache = state.cache.stats();

    let total_jobs = state.repository.count_total().await?;
    let active_jobs = state.repository.count_active().await?;
    let total_executions = state.executions.count_total().await?;
    let recent_executions = state.executions.count_recent_24h().await?;
    let jobs_by_type = state.repository.count_by_job_type().await?.into_iter().collect();

    Ok(Json(Envelope::ok(StatsData {
        scheduler,
        cache,
        database: DatabaseStats {
            total_jobs,
            active_jobs,
            total_executions,
            recent_executions,
            jobs_by_type,
        },
    })))
}
