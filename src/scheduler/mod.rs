//! The scheduling engine: owns one timer per active job, executes jobs
//! single-flight, writes execution history, and periodically resyncs its
//! in-memory view of "which jobs are active" against the store.
//!
//! Per the owned-timing-primitive design, there is no third-party cron
//! timer crate backing this: each active job gets a `tokio` task that
//! computes [`cron::next_after`], sleeps until that instant, fires, and
//! loops. `next_after` is therefore the single source of truth for cadence.

mod executor;

pub use executor::{Executor, StubExecutor};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant as TokioInstant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cache::Cache;
use crate::cron;
use crate::domain::{ExecutionStatus, Job};
use crate::repository::{ExecutionRepository, JobRepository};

const SYNC_INTERVAL: StdDuration = StdDuration::from_secs(30);
const STOP_DRAIN_TIMEOUT: StdDuration = StdDuration::from_secs(30);
const MAX_ACTIVE_JOBS_ON_START: usize = 1000;

#[derive(Debug, Clone, Copy)]
struct RunningExecution {
    exec_id: Uuid,
    started_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct SchedulerStats {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub avg_exec_ms: f64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SchedulerStatsView {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    #[serde(rename = "avgExecMs")]
    pub avg_exec_ms: f64,
    #[serde(rename = "isRunning")]
    pub is_running: bool,
    #[serde(rename = "activeJobs")]
    pub active_jobs: usize,
    #[serde(rename = "runningExecutions")]
    pub running_executions: usize,
    #[serde(rename = "successRate")]
    pub success_rate: String,
}

struct JobHandle {
    cancel: CancellationToken,
}

/// The scheduler's internal mutable state. Mutated only from within
/// `Scheduler` methods; `active`/`running`/`stats` are never touched
/// directly by the control plane.
struct State {
    active: HashMap<Uuid, JobHandle>,
    running: HashMap<Uuid, RunningExecution>,
    stats: SchedulerStats,
    sync_cancel: Option<CancellationToken>,
}

pub struct Scheduler {
    repository: Arc<JobRepository>,
    executions: Arc<ExecutionRepository>,
    cache: Arc<Cache>,
    executor: Arc<dyn Executor>,
    state: Arc<AsyncMutex<State>>,
    is_running: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(
        repository: Arc<JobRepository>,
        executions: Arc<ExecutionRepository>,
        cache: Arc<Cache>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Self {
            repository,
            executions,
            cache,
            executor,
            state: Arc::new(AsyncMutex::new(State {
                active: HashMap::new(),
                running: HashMap::new(),
                stats: SchedulerStats::default(),
                sync_cancel: None,
            })),
            is_running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Idempotent. Loads all due active jobs, schedules each, and arms the
    /// periodic resync.
    pub async fn start(self: &Arc<Self>) -> anyhow::Result<()> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let jobs = self.repository.get_active_jobs().await?;
        let jobs: Vec<_> = jobs.into_iter().take(MAX_ACTIVE_JOBS_ON_START).collect();
        tracing::info!(count = jobs.len(), "scheduler starting, loading active jobs");
        for job in jobs {
            self.schedule_job(job).await;
        }

        let sync_cancel = CancellationToken::new();
        {
            let mut state = self.state.lock().await;
            state.sync_cancel = Some(sync_cancel.clone());
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.sync_loop(sync_cancel).await;
        });

        Ok(())
    }

    /// Cancels the sync loop and every job timer, then waits up to 30s for
    /// in-flight executions to drain.
    pub async fn stop(&self) {
        if !self.is_running.swap(false, Ordering::SeqCst) {
            return;
        }

        let mut state = self.state.lock().await;
        if let Some(cancel) = state.sync_cancel.take() {
            cancel.cancel();
        }
        for (_, handle) in state.active.drain() {
            handle.cancel.cancel();
        }
        drop(state);

        let deadline = TokioInstant::now() + STOP_DRAIN_TIMEOUT;
        loop {
            let still_running = { self.state.lock().await.running.len() };
            if still_running == 0 || TokioInstant::now() >= deadline {
                if still_running > 0 {
                    tracing::warn!(still_running, "scheduler stopped with executions still in flight");
                }
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(200)).await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Installs (or re-installs) the owned timer loop for `job`. Does
    /// nothing if the cron expression is malformed.
    pub async fn schedule_job(self: &Arc<Self>, job: Job) {
        if !job.has_valid_schedule() {
            tracing::warn!(job_id = %job.id, cron = %job.cron_expression, "refusing to schedule job with invalid cron expression");
            return;
        }

        self.unschedule_job(job.id).await;

        let cancel = CancellationToken::new();
        {
            let mut state = self.state.lock().await;
            state.active.insert(job.id, JobHandle { cancel: cancel.clone() });
        }

        let this = Arc::clone(self);
        let job_id = job.id;
        tokio::spawn(async move {
            this.job_loop(job_id, cancel).await;
        });
        tracing::info!(job_id = %job_id, "job scheduled");
    }

    /// Destroys the timer for `id`, if any. Never touches in-flight runs.
    pub async fn unschedule_job(&self, id: Uuid) {
        let mut state = self.state.lock().await;
        if let Some(handle) = state.active.remove(&id) {
            handle.cancel.cancel();
            tracing::info!(job_id = %id, "job unscheduled");
        }
    }

    async fn job_loop(self: Arc<Self>, job_id: Uuid, cancel: CancellationToken) {
        loop {
            let job = match self.repository.find_by_id(job_id).await {
                Ok(Some(job)) if job.is_active => job,
                Ok(_) => {
                    self.unschedule_job(job_id).await;
                    return;
                }
                Err(err) => {
                    tracing::error!(job_id = %job_id, error = %err, "failed to reload job for scheduling, retrying in 1m");
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(StdDuration::from_secs(60)) => continue,
                    }
                }
            };

            let next = cron::next_after(&job.cron_expression, Utc::now());
            let delay = (next - Utc::now()).to_std().unwrap_or(StdDuration::from_secs(0));
            let wake_at = TokioInstant::now() + delay;

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep_until(wake_at) => {
                    let this = Arc::clone(&self);
                    tokio::spawn(async move { this.execute_job(job_id).await; });
                }
            }
        }
    }

    /// Single-flight, at-most-one-concurrent-per-job execution. Called both
    /// by the owned timer loop and by manual triggers.
    ///
    /// The `running` slot is claimed under the same critical section as the
    /// check, with a placeholder entry, so two concurrent callers can never
    /// both observe an empty slot and both proceed — the loser is turned
    /// away before either touches the store. The placeholder is filled in
    /// with the real execution id once `executions.start` returns, and
    /// released on every early-return path.
    pub async fn execute_job(self: Arc<Self>, job_id: Uuid) {
        {
            let mut state = self.state.lock().await;
            if state.running.contains_key(&job_id) {
                tracing::info!(job_id = %job_id, "skipping firing: execution already in flight");
                return;
            }
            state
                .running
                .insert(job_id, RunningExecution { exec_id: Uuid::nil(), started_at: Utc::now() });
        }

        let job = match self.repository.find_by_id(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                self.state.lock().await.running.remove(&job_id);
                return;
            }
            Err(err) => {
                tracing::error!(job_id = %job_id, error = %err, "failed to load job for execution");
                self.state.lock().await.running.remove(&job_id);
                return;
            }
        };

        let execution = match self.executions.start(job_id).await {
            Ok(execution) => execution,
            Err(err) => {
                tracing::error!(job_id = %job_id, error = %err, "failed to create execution record, skipping firing");
                self.state.lock().await.running.remove(&job_id);
                return;
            }
        };

        {
            let mut state = self.state.lock().await;
            if let Some(reservation) = state.running.get_mut(&job_id) {
                reservation.exec_id = execution.id;
                reservation.started_at = execution.started_at;
            }
        }

        let timeout = StdDuration::from_millis(job.timeout_ms.max(0) as u64);
        let result = tokio::time::timeout(timeout, self.executor.execute(&job)).await;

        let (status, error_message, output, success) = match result {
            Ok(Ok(output)) => (ExecutionStatus::Completed, None, Some(output), true),
            Ok(Err(err)) => (ExecutionStatus::Failed, Some(err.to_string()), None, false),
            Err(_) => (
                ExecutionStatus::Timeout,
                Some(format!("execution exceeded timeout of {}ms", job.timeout_ms)),
                None,
                false,
            ),
        };

        if let Err(err) = self
            .executions
            .complete(execution.id, execution.started_at, status, error_message, output)
            .await
        {
            tracing::error!(job_id = %job_id, error = %err, "failed to persist execution completion");
        }

        if let Err(err) = self.repository.update_job_stats(job_id, success).await {
            tracing::error!(job_id = %job_id, error = %err, "failed to update job stats");
        }

        if success {
            let next = cron::next_after(&job.cron_expression, Utc::now());
            if let Err(err) = self.repository.set_next_run_at(job_id, next).await {
                tracing::error!(job_id = %job_id, error = %err, "failed to persist recomputed next_run_at");
            }
        } else {
            self.retry_hook(&job, error_message_for_log(status));
        }

        self.cache.delete(&format!("job:{job_id}"));
        self.cache.delete_prefixed("jobs:");

        let duration_ms = (Utc::now() - execution.started_at).num_milliseconds() as f64;
        {
            let mut state = self.state.lock().await;
            state.running.remove(&job_id);
            let stats = &mut state.stats;
            stats.total += 1;
            if success {
                stats.successful += 1;
            } else {
                stats.failed += 1;
            }
            let n = stats.total as f64;
            stats.avg_exec_ms += (duration_ms - stats.avg_exec_ms) / n;
        }
    }

    /// Retry policy hook: receives the failed job and is responsible for
    /// deciding whether a delayed retry is warranted. `retry_count` on the
    /// next execution row for the same logical invocation must never
    /// exceed `max_retries` — left as a logging hook today rather than an
    /// actual delayed re-fire (see DESIGN.md).
    fn retry_hook(&self, job: &Job, reason: &str) {
        tracing::warn!(
            job_id = %job.id,
            max_retries = job.max_retries,
            retry_delay_ms = job.retry_delay_ms,
            reason,
            "job execution failed; retry policy hook invoked"
        );
    }

    async fn sync_loop(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(SYNC_INTERVAL) => {}
            }
            if let Err(err) = self.clone().sync().await {
                tracing::error!(error = %err, "scheduler resync failed");
            }
        }
    }

    /// Diffs the store's `is_active` jobs against the in-memory `active`
    /// map and reconciles. Deliberately does not use `get_active_jobs`
    /// (which filters on `next_run_at <= now()`) because that can
    /// transiently omit a job between fires.
    async fn sync(self: Arc<Self>) -> anyhow::Result<()> {
        let jobs = self.repository.get_all_active().await?;
        let job_ids: std::collections::HashSet<Uuid> = jobs.iter().map(|j| j.id).collect();

        let currently_scheduled: Vec<Uuid> = {
            let state = self.state.lock().await;
            state.active.keys().copied().collect()
        };

        for id in &currently_scheduled {
            if !job_ids.contains(id) {
                self.unschedule_job(*id).await;
            }
        }

        for job in jobs {
            let already_scheduled = currently_scheduled.contains(&job.id);
            if !already_scheduled {
                self.schedule_job(job).await;
            }
        }

        Ok(())
    }

    pub async fn stats(&self) -> SchedulerStatsView {
        let state = self.state.lock().await;
        let total = state.stats.total;
        let success_rate = if total == 0 {
            "0.00".to_string()
        } else {
            format!("{:.2}", (state.stats.successful as f64 / total as f64) * 100.0)
        };
        SchedulerStatsView {
            total: state.stats.total,
            successful: state.stats.successful,
            failed: state.stats.failed,
            avg_exec_ms: state.stats.avg_exec_ms,
            is_running: self.is_running(),
            active_jobs: state.active.len(),
            running_executions: state.running.len(),
            success_rate,
        }
    }

    pub async fn is_scheduled(&self, id: Uuid) -> bool {
        self.state.lock().await.active.contains_key(&id)
    }
}

fn error_message_for_log(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Timeout => "timeout",
        ExecutionStatus::Failed => "failed",
        _ => "unknown",
    }
}
