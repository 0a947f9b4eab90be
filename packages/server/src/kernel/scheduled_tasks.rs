//! Scheduled background tasks using tokio-cron-scheduler.
//!
//! Scheduled tasks never do work directly. Each one enqueues a command with
//! `Trigger::Scheduled`, and the executor runs it like any other:
//!
//! ```text
//! Scheduler (COMMAND_PURGE_SCHEDULE)
//!     │
//!     └─► publish_scheduled(CleanupCommandHistory)
//!             └─► Queued → worker → purge_history()
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use command_queue::{CleanupCommandHistory, Command, CommandQueueConfig, CommandScheduler, CommandService};
use tokio::task::JoinHandle;
use tokio_cron_scheduler::JobScheduler;

/// Start all scheduled tasks
///
/// Returns the running scheduler and the listener that tracks each task's
/// last completed run.
pub async fn start_scheduler(
    service: Arc<CommandService>,
    config: &CommandQueueConfig,
) -> Result<(JobScheduler, JoinHandle<()>)> {
    let scheduler = CommandScheduler::new(service)
        .with_task(CleanupCommandHistory::NAME, config.purge_schedule.as_str())
        .context("Failed to schedule command history cleanup")?;

    let started = scheduler.start().await?;

    tracing::info!(
        schedule = %config.purge_schedule,
        "Scheduled tasks started (command history cleanup)"
    );
    Ok(started)
}
