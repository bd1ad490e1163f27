mod common;

use cronforge_core::domain::{Job, JobType};
use cronforge_core::pagination::PaginationParams;
use cronforge_core::repository::JobFilter;

use common::TestHarness;

fn sample_job(name: &str) -> Job {
    Job::builder()
        .name(name)
        .cron_expression("*/5 * * * *")
        .build()
}

#[tokio::test]
async fn create_then_find_by_id_round_trips() {
    let harness = TestHarness::new().await;
    let created = harness.jobs.create(sample_job("nightly-report")).await.unwrap();

    assert_eq!(created.name, "nightly-report");
    assert!(created.next_run_at.is_some(), "active job gets a next_run_at on create");

    let found = harness.jobs.find_by_id(created.id).await.unwrap();
    assert_eq!(found.unwrap().id, created.id);
}

#[tokio::test]
async fn inactive_job_has_no_next_run_at() {
    let harness = TestHarness::new().await;
    let job = Job::builder()
        .name("paused-job")
        .cron_expression("0 0 * * *")
        .is_active(false)
        .build();

    let created = harness.jobs.create(job).await.unwrap();
    assert!(created.next_run_at.is_none());
}

#[tokio::test]
async fn update_recomputes_next_run_at_only_when_cron_or_activation_changes() {
    let harness = TestHarness::new().await;
    let created = harness.jobs.create(sample_job("recompute-me")).await.unwrap();
    let original_next_run = created.next_run_at;

    // Renaming alone should not touch next_run_at.
    let renamed = harness
        .jobs
        .update(
            created.id,
            cronforge_core::repository::JobPatch {
                name: Some("renamed".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(renamed.next_run_at, original_next_run);

    // Deactivating clears it.
    let deactivated = harness
        .jobs
        .update(
            created.id,
            cronforge_core::repository::JobPatch {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert!(deactivated.next_run_at.is_none());

    // Reactivating recomputes it.
    let reactivated = harness
        .jobs
        .update(
            created.id,
            cronforge_core::repository::JobPatch {
                is_active: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert!(reactivated.next_run_at.is_some());
}

#[tokio::test]
async fn delete_cascades_to_executions() {
    let harness = TestHarness::new().await;
    let created = harness.jobs.create(sample_job("cascade-me")).await.unwrap();
    harness.executions.start(created.id).await.unwrap();
    harness.executions.start(created.id).await.unwrap();

    harness.jobs.delete(created.id).await.unwrap();

    let pagination = PaginationParams { page: None, limit: None }.validate().unwrap();
    let (rows, total) = harness.executions.find_for_job(created.id, pagination).await.unwrap();
    assert_eq!(total, 0);
    assert!(rows.is_empty());
}

#[tokio::test]
async fn find_all_filters_by_is_active_job_type_and_tags() {
    let harness = TestHarness::new().await;

    let active_recurring = Job::builder()
        .name("active-recurring")
        .cron_expression("*/10 * * * *")
        .job_type(JobType::Recurring)
        .tags(vec!["billing".to_string()])
        .build();
    harness.jobs.create(active_recurring).await.unwrap();

    let inactive = Job::builder()
        .name("inactive-one")
        .cron_expression("0 12 * * *")
        .is_active(false)
        .build();
    harness.jobs.create(inactive).await.unwrap();

    let pagination = PaginationParams { page: None, limit: None }.validate().unwrap();

    let filter = JobFilter { is_active: Some(true), ..Default::default() };
    let (rows, total) = harness.jobs.find_all(pagination, &filter).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(rows[0].name, "active-recurring");

    let filter = JobFilter { tags: vec!["billing".to_string()], ..Default::default() };
    let (rows, total) = harness.jobs.find_all(pagination, &filter).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(rows[0].name, "active-recurring");

    let filter = JobFilter { job_type: Some(JobType::Scheduled), ..Default::default() };
    let (_, total) = harness.jobs.find_all(pagination, &filter).await.unwrap();
    assert_eq!(total, 1, "the inactive job defaults to JobType::Scheduled");
}

#[tokio::test]
async fn update_job_stats_keeps_counters_coherent_under_concurrent_completions() {
    let harness = TestHarness::new().await;
    let created = harness.jobs.create(sample_job("hammered-job")).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..10 {
        let repo = std::sync::Arc::clone(&harness.jobs);
        let id = created.id;
        handles.push(tokio::spawn(async move {
            repo.update_job_stats(id, i % 2 == 0).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let reloaded = harness.jobs.find_by_id(created.id).await.unwrap().unwrap();
    assert_eq!(reloaded.total_runs, 10);
    assert_eq!(reloaded.successful_runs + reloaded.failed_runs, 10);
    assert_eq!(reloaded.successful_runs, 5);
}

#[tokio::test]
async fn count_by_job_type_groups_every_row() {
    let harness = TestHarness::new().await;
    harness.jobs.create(sample_job("a")).await.unwrap();
    harness
        .jobs
        .create(
            Job::builder()
                .name("b")
                .cron_expression("* * * * *")
                .job_type(JobType::Immediate)
                .build(),
        )
        .await
        .unwrap();

    let counts = harness.jobs.count_by_job_type().await.unwrap();
    let total: i64 = counts.iter().map(|(_, n)| n).sum();
    assert_eq!(total, 2);
    assert_eq!(harness.jobs.count_total().await.unwrap(), 2);
    assert_eq!(harness.jobs.count_active().await.unwrap(), 2);
}
