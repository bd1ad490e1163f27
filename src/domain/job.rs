use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::cron;
use crate::errors::{AppError, FieldError};

pub const MAX_NAME_LEN: usize = 255;
pub const MAX_DESCRIPTION_LEN: usize = 1000;
pub const MAX_TAG_LEN: usize = 50;
pub const MAX_TAGS: usize = 10;
pub const MAX_CREATED_BY_LEN: usize = 255;

pub const MIN_TIMEOUT_MS: i32 = 1000;
pub const MAX_TIMEOUT_MS: i32 = 300_000;
pub const MAX_MAX_RETRIES: i32 = 10;
pub const MIN_RETRY_DELAY_MS: i32 = 1000;
pub const MAX_RETRY_DELAY_MS: i32 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "job_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    #[default]
    Scheduled,
    Immediate,
    Recurring,
    Delayed,
}

/// A scheduled job as persisted by the store. Plain value record — no
/// behavior beyond validation and the derived-field recomputation that has
/// to live next to the fields it derives.
#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
#[builder(field_defaults(setter(into)))]
pub struct Job {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,

    pub name: String,
    #[builder(default, setter(strip_option))]
    pub description: Option<String>,
    pub cron_expression: String,
    #[builder(default = true)]
    pub is_active: bool,
    #[builder(default)]
    pub job_type: JobType,
    #[builder(default = serde_json::json!({}))]
    pub payload: serde_json::Value,

    #[builder(default = 30_000)]
    pub timeout_ms: i32,
    #[builder(default = 3)]
    pub max_retries: i32,
    #[builder(default = 5_000)]
    pub retry_delay_ms: i32,

    #[builder(default, setter(strip_option))]
    pub created_by: Option<String>,
    #[builder(default)]
    pub tags: Vec<String>,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,

    #[builder(default, setter(strip_option))]
    pub last_run_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub next_run_at: Option<DateTime<Utc>>,

    #[builder(default = 0)]
    pub total_runs: i64,
    #[builder(default = 0)]
    pub successful_runs: i64,
    #[builder(default = 0)]
    pub failed_runs: i64,
}

impl Job {
    /// Validates every field, collecting all failures rather than stopping
    /// at the first one so a single response can carry the full list.
    pub fn validate_fields(
        name: &str,
        description: Option<&str>,
        cron_expression: &str,
        timeout_ms: i32,
        max_retries: i32,
        retry_delay_ms: i32,
        created_by: Option<&str>,
        tags: &[String],
    ) -> Result<(), AppError> {
        let mut errors = Vec::new();

        if name.trim().is_empty() {
            errors.push(FieldError::new("name", "name must not be empty"));
        } else if name.len() > MAX_NAME_LEN {
            errors.push(FieldError::new(
                "name",
                format!("name must be at most {MAX_NAME_LEN} characters"),
            ));
        }

        if let Some(desc) = description {
            if desc.len() > MAX_DESCRIPTION_LEN {
                errors.push(FieldError::new(
                    "description",
                    format!("description must be at most {MAX_DESCRIPTION_LEN} characters"),
                ));
            }
        }

        if !cron::validate(cron_expression) {
            errors.push(FieldError::new(
                "cronExpression",
                "cronExpression must be a valid 5-field cron expression",
            ));
        }

        if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&timeout_ms) {
            errors.push(FieldError::new(
                "timeoutMs",
                format!("timeoutMs must be between {MIN_TIMEOUT_MS} and {MAX_TIMEOUT_MS}"),
            ));
        }

        if !(0..=MAX_MAX_RETRIES).contains(&max_retries) {
            errors.push(FieldError::new(
                "maxRetries",
                format!("maxRetries must be between 0 and {MAX_MAX_RETRIES}"),
            ));
        }

        if !(MIN_RETRY_DELAY_MS..=MAX_RETRY_DELAY_MS).contains(&retry_delay_ms) {
            errors.push(FieldError::new(
                "retryDelayMs",
                format!("retryDelayMs must be between {MIN_RETRY_DELAY_MS} and {MAX_RETRY_DELAY_MS}"),
            ));
        }

        if let Some(created_by) = created_by {
            if created_by.len() > MAX_CREATED_BY_LEN {
                errors.push(FieldError::new(
                    "createdBy",
                    format!("createdBy must be at most {MAX_CREATED_BY_LEN} characters"),
                ));
            }
        }

        if tags.len() > MAX_TAGS {
            errors.push(FieldError::new(
                "tags",
                format!("at most {MAX_TAGS} tags are allowed"),
            ));
        }
        for tag in tags {
            if tag.len() > MAX_TAG_LEN {
                errors.push(FieldError::new(
                    "tags",
                    format!("each tag must be at most {MAX_TAG_LEN} characters"),
                ));
                break;
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::validation(errors))
        }
    }

    /// Whether this job currently has a well-formed schedule.
    pub fn has_valid_schedule(&self) -> bool {
        cron::validate(&self.cron_expression)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_has_default_max_retries_of_3() {
        let job = Job::builder()
            .name("tick")
            .cron_expression("* * * * *")
            .build();
        assert_eq!(job.max_retries, 3);
    }

    #[test]
    fn new_job_defaults_to_active_and_scheduled() {
        let job = Job::builder()
            .name("tick")
            .cron_expression("* * * * *")
            .build();
        assert!(job.is_active);
        assert_eq!(job.job_type, JobType::Scheduled);
    }

    #[test]
    fn validation_rejects_empty_name_and_bad_cron() {
        let result = Job::validate_fields("", None, "bogus", 30_000, 3, 5_000, None, &[]);
        let Err(AppError::ValidationFailure(fields)) = result else {
            panic!("expected validation failure");
        };
        let field_names: Vec<_> = fields.iter().map(|f| f.field.as_str()).collect();
        assert!(field_names.contains(&"name"));
        assert!(field_names.contains(&"cronExpression"));
    }

    #[test]
    fn validation_boundary_timeout_ms() {
        assert!(Job::validate_fields("a", None, "* * * * *", 1000, 3, 5_000, None, &[]).is_ok());
        assert!(Job::validate_fields("a", None, "* * * * *", 999, 3, 5_000, None, &[]).is_err());
        assert!(Job::validate_fields("a", None, "* * * * *", 300_000, 3, 5_000, None, &[]).is_ok());
        assert!(Job::validate_fields("a", None, "* * * * *", 300_001, 3, 5_000, None, &[]).is_err());
    }

    #[test]
    fn validation_rejects_too_many_tags() {
        let tags: Vec<String> = (0..11).map(|i| format!("tag{i}")).collect();
        assert!(Job::validate_fields("a", None, "* * * * *", 30_000, 3, 5_000, None, &tags).is_err());
    }
}
