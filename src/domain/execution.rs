use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "execution_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    #[default]
    Running,
    Completed,
    Failed,
    Timeout,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }
}

/// A single attempt to run a job. Append-only: created once in the
/// `running` state and mutated exactly once, on termination.
#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
#[builder(field_defaults(setter(into)))]
pub struct JobExecution {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,
    pub job_id: Uuid,
    #[builder(default)]
    pub status: ExecutionStatus,
    #[builder(default = Utc::now())]
    pub started_at: DateTime<Utc>,
    #[builder(default, setter(strip_option))]
    pub completed_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub duration_ms: Option<i64>,
    #[builder(default, setter(strip_option))]
    pub error_message: Option<String>,
    #[builder(default = 0)]
    pub retry_count: i32,
    #[builder(default, setter(strip_option))]
    pub output: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_execution_starts_running_with_no_completion_time() {
        let exec = JobExecution::builder().job_id(Uuid::new_v4()).build();
        assert_eq!(exec.status, ExecutionStatus::Running);
        assert!(exec.completed_at.is_none());
        assert!(!exec.status.is_terminal());
    }

    #[test]
    fn terminal_statuses_report_terminal() {
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::Timeout.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
    }
}
