mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cronforge_core::domain::{ExecutionStatus, Job};
use cronforge_core::scheduler::StubExecutor;

use common::{CountingExecutor, FailingExecutor, SlowExecutor, TestHarness};

async fn seed_job(harness: &TestHarness, name: &str, cron: &str) -> Job {
    let job = Job::builder().name(name).cron_expression(cron).build();
    harness.jobs.create(job).await.unwrap()
}

#[tokio::test]
async fn execute_job_records_a_completed_execution_and_advances_next_run_at() {
    let harness = TestHarness::new().await;
    let job = seed_job(&harness, "stub-job", "*/5 * * * *").await;
    let scheduler = harness.scheduler(Arc::new(StubExecutor));

    Arc::clone(&scheduler).execute_job(job.id).await;

    let reloaded = harness.jobs.find_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(reloaded.total_runs, 1);
    assert_eq!(reloaded.successful_runs, 1);
    assert!(reloaded.next_run_at.is_some());
    assert!(reloaded.last_run_at.is_some());

    let stats = scheduler.stats().await;
    assert_eq!(stats.total, 1);
    assert_eq!(stats.successful, 1);
    assert_eq!(stats.running_executions, 0);
}

#[tokio::test]
async fn execute_job_records_timeout_when_executor_exceeds_timeout_ms() {
    let harness = TestHarness::new().await;
    let job = Job::builder()
        .name("slow-job")
        .cron_expression("0 * * * *")
        .timeout_ms(50)
        .build();
    let job = harness.jobs.create(job).await.unwrap();

    let executor = Arc::new(SlowExecutor { delay: Duration::from_millis(500) });
    let scheduler = harness.scheduler(executor);

    Arc::clone(&scheduler).execute_job(job.id).await;

    let reloaded = harness.jobs.find_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(reloaded.failed_runs, 1);
    assert_eq!(reloaded.total_runs, 1);

    let (executions, _) = harness
        .executions
        .find_for_job(
            job.id,
            cronforge_core::pagination::PaginationParams { page: None, limit: None }
                .validate()
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(executions[0].status, ExecutionStatus::Timeout);
}

#[tokio::test]
async fn execute_job_records_failed_on_executor_error() {
    let harness = TestHarness::new().await;
    let job = seed_job(&harness, "failing-job", "0 0 * * *").await;
    let scheduler = harness.scheduler(Arc::new(FailingExecutor));

    Arc::clone(&scheduler).execute_job(job.id).await;

    let reloaded = harness.jobs.find_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(reloaded.failed_runs, 1);

    let (executions, _) = harness
        .executions
        .find_for_job(
            job.id,
            cronforge_core::pagination::PaginationParams { page: None, limit: None }
                .validate()
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(executions[0].status, ExecutionStatus::Failed);
    assert!(executions[0].error_message.is_some());
}

#[tokio::test]
async fn concurrent_execute_job_calls_are_single_flight() {
    let harness = TestHarness::new().await;
    let job = seed_job(&harness, "single-flight-job", "0 0 * * *").await;

    let calls = Arc::new(AtomicUsize::new(0));
    let executor = Arc::new(CountingExecutor { calls: Arc::clone(&calls), delay: Duration::from_millis(300) });
    let scheduler = harness.scheduler(executor);

    // The `running` slot is claimed atomically with the single-flight check,
    // so firing both calls with no stagger still must only let one through —
    // this is what a burst of manual triggers on the same job looks like.
    let first = Arc::clone(&scheduler).execute_job(job.id);
    let second = Arc::clone(&scheduler).execute_job(job.id);

    tokio::join!(first, second);

    assert_eq!(calls.load(Ordering::SeqCst), 1, "second firing must be skipped while the first is in flight");

    let reloaded = harness.jobs.find_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(reloaded.total_runs, 1);
}

#[tokio::test]
async fn schedule_job_then_unschedule_job_toggles_is_scheduled() {
    let harness = TestHarness::new().await;
    let job = seed_job(&harness, "scheduled-job", "*/5 * * * *").await;
    let scheduler = harness.scheduler(Arc::new(StubExecutor));

    assert!(!scheduler.is_scheduled(job.id).await);

    scheduler.schedule_job(job.clone()).await;
    assert!(scheduler.is_scheduled(job.id).await);

    scheduler.unschedule_job(job.id).await;
    assert!(!scheduler.is_scheduled(job.id).await);
}

#[tokio::test]
async fn schedule_job_refuses_invalid_cron_expressions() {
    let harness = TestHarness::new().await;
    let mut job = seed_job(&harness, "bad-cron-job", "*/5 * * * *").await;
    job.cron_expression = "not a cron expression".to_string();
    let scheduler = harness.scheduler(Arc::new(StubExecutor));

    scheduler.schedule_job(job.clone()).await;
    assert!(!scheduler.is_scheduled(job.id).await);
}

#[tokio::test]
async fn start_is_idempotent_and_stop_drains_cleanly() {
    let harness = TestHarness::new().await;
    seed_job(&harness, "on-start-job", "*/5 * * * *").await;
    let scheduler = harness.scheduler(Arc::new(StubExecutor));

    scheduler.start().await.unwrap();
    assert!(scheduler.is_running());

    // start() is idempotent: a second call must not spawn a second sync loop.
    scheduler.start().await.unwrap();
    assert!(scheduler.is_running());

    scheduler.stop().await;
    assert!(!scheduler.is_running());
}
