//! Shared test infrastructure: a single Postgres testcontainer reused across
//! every integration test in this crate, migrated once on first use.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::PgPool;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

use async_trait::async_trait;
use cronforge_core::cache::Cache;
use cronforge_core::domain::Job;
use cronforge_core::repository::{ExecutionRepository, JobRepository};
use cronforge_core::scheduler::{Executor, Scheduler};

struct SharedTestInfra {
    db_url: String,
    _postgres: ContainerAsync<Postgres>,
}

static SHARED_INFRA: OnceCell<SharedTestInfra> = OnceCell::const_new();

impl SharedTestInfra {
    async fn init() -> Result<Self> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let postgres = Postgres::default()
            .start()
            .await
            .context("failed to start postgres container")?;

        let host = postgres.get_host().await?;
        let port = postgres.get_host_port_ipv4(5432).await?;
        let db_url = format!("postgresql://postgres:postgres@{host}:{port}/postgres");

        let pool = PgPool::connect(&db_url)
            .await
            .context("failed to connect to test database")?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run migrations")?;
        pool.close().await;

        Ok(Self { db_url, _postgres: postgres })
    }

    async fn get() -> &'static Self {
        SHARED_INFRA
            .get_or_init(|| async { Self::init().await.expect("shared test infra init") })
            .await
    }
}

/// A fresh pool plus the repositories and scheduler built over it, per test.
/// Every test gets its own pool (cheap) against the one shared container.
pub struct TestHarness {
    pub pool: PgPool,
    pub jobs: Arc<JobRepository>,
    pub executions: Arc<ExecutionRepository>,
    pub cache: Arc<Cache>,
}

impl TestHarness {
    pub async fn new() -> Self {
        let infra = SharedTestInfra::get().await;
        let pool = PgPool::connect(&infra.db_url)
            .await
            .expect("failed to connect to shared test database");

        // Each test run leaves rows behind; truncate so tests stay isolated
        // from each other without needing a container per test.
        sqlx::query("TRUNCATE TABLE job_executions, jobs")
            .execute(&pool)
            .await
            .expect("failed to truncate tables between tests");

        Self {
            jobs: Arc::new(JobRepository::new(pool.clone())),
            executions: Arc::new(ExecutionRepository::new(pool.clone())),
            cache: Arc::new(Cache::new()),
            pool,
        }
    }

    pub fn scheduler(&self, executor: Arc<dyn Executor>) -> Arc<Scheduler> {
        Arc::new(Scheduler::new(
            Arc::clone(&self.jobs),
            Arc::clone(&self.executions),
            Arc::clone(&self.cache),
            executor,
        ))
    }
}

/// Sleeps longer than the job's timeout so tests can exercise the timeout
/// and single-flight paths without racing real work.
pub struct SlowExecutor {
    pub delay: std::time::Duration,
}

#[async_trait]
impl Executor for SlowExecutor {
    async fn execute(&self, job: &Job) -> anyhow::Result<serde_json::Value> {
        tokio::time::sleep(self.delay).await;
        Ok(serde_json::json!({ "jobId": job.id }))
    }
}

/// Always fails, for exercising the failed-execution and retry-hook paths.
pub struct FailingExecutor;

#[async_trait]
impl Executor for FailingExecutor {
    async fn execute(&self, _job: &Job) -> anyhow::Result<serde_json::Value> {
        anyhow::bail!("simulated executor failure")
    }
}

/// Counts how many times `execute` actually ran its body, for asserting
/// single-flight skips concurrent firings rather than queuing them.
pub struct CountingExecutor {
    pub calls: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    pub delay: std::time::Duration,
}

#[async_trait]
impl Executor for CountingExecutor {
    async fn execute(&self, job: &Job) -> anyhow::Result<serde_json::Value> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(serde_json::json!({ "jobId": job.id }))
    }
}
