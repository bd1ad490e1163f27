use async_trait::async_trait;

use crate::domain::Job;

/// The thing a firing actually invokes. This crate is a scheduling engine,
/// not a task runtime — the default executor only simulates work by
/// echoing the job's payload back as output.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, job: &Job) -> anyhow::Result<serde_json::Value>;
}

pub struct StubExecutor;

#[async_trait]
impl Executor for StubExecutor {
    async fn execute(&self, job: &Job) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::json!({
            "jobId": job.id,
            "jobType": job.job_type,
            "echo": job.payload,
        }))
    }
}
