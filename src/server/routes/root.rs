//! Service info endpoint.

use std::sync::atomic::Ordering;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::server::app::AppState;

#[derive(Serialize)]
struct ServiceInfo {
    success: bool,
    name: &'static str,
    version: &'static str,
    timestamp: chrono::DateTime<Utc>,
}

pub async fn handler(State(state): State<AppState>) -> (StatusCode, Json<ServiceInfo>) {
    let status = if state.shutting_down.load(Ordering::SeqCst) {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        status,
        Json(ServiceInfo {
            success: status == StatusCode::OK,
            name: "cronforge",
            version: env!("CARGO_PKG_VERSION"),
            timestamp: Utc::now(),
        }),
    )
}
