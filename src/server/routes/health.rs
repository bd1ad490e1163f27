//! Health check endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::server::app::AppState;
use crate::store;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    database: store::HealthStatus,
    timestamp: chrono::DateTime<Utc>,
}

pub async fn handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = store::health_check(&state.pool).await;
    let status_code = if database.healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        status_code,
        Json(HealthResponse {
            status: if database.healthy { "healthy" } else { "unhealthy" },
            database,
            timestamp: Utc::now(),
        }),
    )
}
