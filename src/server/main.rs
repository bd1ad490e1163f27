// Main entry point for the scheduler service.

use anyhow::{Context, Result};
use cronforge_core::scheduler::{Scheduler, StubExecutor};
use cronforge_core::server::build_app;
use cronforge_core::Config;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            if config.is_production() {
                "info,cronforge_core=info,sqlx=warn".into()
            } else {
                "info,cronforge_core=debug,sqlx=warn".into()
            }
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting cron scheduler service");
    tracing::info!(timezone = %config.timezone, "cron evaluation is fixed to Asia/Kolkata regardless of this value");

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations complete");

    let (app, scheduler, shutting_down) = build_app(pool, config.clone(), Arc::new(StubExecutor));

    scheduler
        .start()
        .await
        .context("Failed to start scheduler")?;
    tracing::info!("Scheduler started");

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    let shutdown_scheduler: Arc<Scheduler> = Arc::clone(&scheduler);
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received, draining scheduler");
        shutting_down.store(true, std::sync::atomic::Ordering::SeqCst);
        shutdown_scheduler.stop().await;
    });

    server.await.context("Server error")?;

    Ok(())
}
