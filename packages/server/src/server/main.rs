// Main entry point for API server

use std::sync::Arc;

use anyhow::{Context, Result};
use command_queue::{CommandExecutor, PostgresCommandStore, ProgressLayer};
use server_core::kernel::{build_service, handler_registry, start_scheduler};
use server_core::server::{build_app, AppState};
use server_core::Config;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Progress logged by running commands is forwarded to clients
    let (progress_layer, progress_broadcast) = ProgressLayer::new();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "info,command_queue=debug,server_core=debug,sqlx=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(progress_layer)
        .init();

    tracing::info!("Starting command queue API");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    // Connect to database
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    // Run migrations
    tracing::info!("Running database migrations...");
    let store = PostgresCommandStore::new(pool.clone());
    store.migrate().await?;
    tracing::info!("Migrations complete");

    // Command queue
    let service = build_service(Arc::new(store), &config.queue)
        .context("Failed to build command catalog")?;
    let registry = handler_registry().context("Failed to register command handlers")?;

    let executor = CommandExecutor::new(service.clone(), registry)
        .with_config(config.queue.executor_config())
        .start()
        .await
        .context("Failed to start command executor")?;
    let progress_task = progress_broadcast.spawn(service.clone());

    let (mut scheduler, schedule_listener) = start_scheduler(service.clone(), &config.queue)
        .await
        .context("Failed to start scheduled tasks")?;

    // Build application
    let app = build_app(AppState::new(service, Some(pool.clone())));

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Shutting down");

    if let Err(e) = scheduler.shutdown().await {
        tracing::warn!(error = %e, "Scheduler did not shut down cleanly");
    }
    schedule_listener.abort();

    // Lets in-flight commands finish within the shutdown timeout
    executor.shutdown().await;
    progress_task.abort();
    pool.close().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        // Without a signal handler, run until killed
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
