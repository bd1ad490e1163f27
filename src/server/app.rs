//! Application setup: composition root wiring Store, Cache, Repository,
//! and Scheduler into shared state, and the router with its ambient
//! middleware stack.

use std::str::FromStr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use axum::error_handling::HandleErrorLayer;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::routing::{get, post};
use axum::{BoxError, Json, Router};
use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::cache::Cache;
use crate::config::Config;
use crate::repository::{ExecutionRepository, JobRepository};
use crate::scheduler::{Executor, Scheduler};
use crate::server::routes::{executions, health, jobs, root, stats};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub repository: Arc<JobRepository>,
    pub executions: Arc<ExecutionRepository>,
    pub cache: Arc<Cache>,
    pub scheduler: Arc<Scheduler>,
    pub config: Arc<Config>,
    /// Flipped once graceful shutdown begins; `GET /` reports 503 instead
    /// of 200 so a load balancer stops routing new traffic here.
    pub shutting_down: Arc<AtomicBool>,
}

/// Builds the router and the scheduler that backs it. Callers are
/// responsible for calling `scheduler.start()` after the database is
/// migrated and for calling `scheduler.stop()` on shutdown, and should flip
/// the returned flag before doing so.
pub fn build_app(
    pool: PgPool,
    config: Config,
    executor: Arc<dyn Executor>,
) -> (Router, Arc<Scheduler>, Arc<AtomicBool>) {
    let repository = Arc::new(JobRepository::new(pool.clone()));
    let executions = Arc::new(ExecutionRepository::new(pool.clone()));
    let cache = Arc::new(Cache::new());
    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&repository),
        Arc::clone(&executions),
        Arc::clone(&cache),
        executor,
    ));

    let shutting_down = Arc::new(AtomicBool::new(false));

    let state = AppState {
        pool,
        repository,
        executions,
        cache,
        scheduler: Arc::clone(&scheduler),
        config: Arc::new(config.clone()),
        shutting_down: Arc::clone(&shutting_down),
    };

    let cors = build_cors(&config);

    let app = Router::new()
        .route("/", get(root::handler))
        .route("/health", get(health::handler))
        .route("/jobs", get(jobs::list).post(jobs::create))
        .route("/jobs/stats", get(stats::handler))
        .route("/jobs/validate-cron", post(jobs::validate_cron))
        .route("/jobs/:id", get(jobs::get_one).put(jobs::update).delete(jobs::delete))
        .route("/jobs/:id/trigger", post(jobs::trigger))
        .route("/jobs/:id/executions", get(executions::list))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_request_timeout))
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT)),
        )
        .layer(CompressionLayer::new())
        .layer(cors);

    (app, scheduler, shutting_down)
}

#[derive(Serialize)]
struct TimeoutBody {
    success: bool,
    error: &'static str,
    message: &'static str,
    timestamp: chrono::DateTime<Utc>,
}

/// The 30s per-request deadline expires without mutating any state — the
/// handler never runs to completion, so there's nothing to roll back.
async fn handle_request_timeout(err: BoxError) -> (StatusCode, Json<TimeoutBody>) {
    let status = if err.is::<tower::timeout::error::Elapsed>() {
        StatusCode::REQUEST_TIMEOUT
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };

    (
        status,
        Json(TimeoutBody {
            success: false,
            error: "Request Timeout",
            message: "the request exceeded the server's 30s deadline",
            timestamp: Utc::now(),
        }),
    )
}

fn build_cors(config: &Config) -> CorsLayer {
    let allow_any = config.allowed_origins.iter().any(|o| o == "*");
    let origins = if allow_any {
        AllowOrigin::any()
    } else {
        let parsed: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| HeaderValue::from_str(o).ok())
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
}
