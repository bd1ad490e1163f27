//! Typed error hierarchy shared across the store, repository, scheduler, and
//! control plane. Every fallible call in this crate returns `AppError` (or a
//! type that converts into it), so the HTTP layer has a single mapping to
//! status codes instead of matching on driver-specific errors at the edge.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

/// A single field-level validation failure.
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
    pub value: Option<serde_json::Value>,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            value: None,
        }
    }

    pub fn with_value(mut self, value: serde_json::Value) -> Self {
        self.value = Some(value);
        self
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("validation failed")]
    ValidationFailure(Vec<FieldError>),

    #[error("{0} not found")]
    NotFound(String),

    /// An execution is already in flight for this job. Never surfaced over
    /// HTTP directly; the scheduler swallows it and logs the skipped firing.
    #[error("an execution is already running for job {0}")]
    SingleFlight(uuid::Uuid),

    #[error("operation timed out after {0}ms")]
    Timeout(i64),

    #[error("store error: {0}")]
    TransientStore(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    FatalConfig(String),

    #[error(transparent)]
    Unknown(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(errors: Vec<FieldError>) -> Self {
        AppError::ValidationFailure(errors)
    }

    pub fn single_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::ValidationFailure(vec![FieldError::new(field, message)])
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::ValidationFailure(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::SingleFlight(_) => StatusCode::CONFLICT,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::TransientStore(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::FatalConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            AppError::ValidationFailure(_) => "Validation Error",
            AppError::NotFound(_) => "Not Found",
            AppError::SingleFlight(_) => "Conflict",
            AppError::Timeout(_) => "Timeout",
            AppError::TransientStore(_) => "Store Error",
            AppError::FatalConfig(_) => "Configuration Error",
            AppError::Unknown(_) => "Internal Error",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Vec<FieldError>>,
    timestamp: chrono::DateTime<Utc>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if !matches!(self, AppError::ValidationFailure(_) | AppError::SingleFlight(_)) {
            tracing::error!(error = %self, "request failed");
        }

        let status = self.status();
        let kind = self.kind();
        let details = match &self {
            AppError::ValidationFailure(fields) => Some(fields.clone()),
            _ => None,
        };
        let message = self.to_string();

        let body = ErrorBody {
            success: false,
            error: kind,
            message,
            details,
            timestamp: Utc::now(),
        };

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
