//! Cron-driven submission of commands by logical name.
//!
//! ```text
//! JobScheduler (cron)
//!     │
//!     └─► CommandScheduler::publish(name)
//!             └─► CommandService::publish_scheduled  (Trigger::Scheduled)
//!                     └─► workers execute → Executed event
//!                             └─► last execution time recorded
//! ```

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, info, warn};

use crate::events::CommandEvent;
use crate::record::{CommandRecord, CommandStatus};
use crate::service::CommandService;

/// A logical command name plus the last time that command ran.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledCommand {
    pub name: String,
    pub last_execution: Option<DateTime<Utc>>,
}

impl ScheduledCommand {
    pub fn new(name: impl Into<String>, last_execution: Option<DateTime<Utc>>) -> Self {
        Self {
            name: name.into(),
            last_execution,
        }
    }
}

/// A cron expression bound to a registered command.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledTask {
    pub name: &'static str,
    pub cron: String,
}

/// Publishes scheduled commands and remembers when each last completed.
pub struct CommandScheduler {
    service: Arc<CommandService>,
    tasks: Vec<ScheduledTask>,
    last_executions: Arc<DashMap<&'static str, DateTime<Utc>>>,
}

impl CommandScheduler {
    pub fn new(service: Arc<CommandService>) -> Self {
        Self {
            service,
            tasks: Vec::new(),
            last_executions: Arc::new(DashMap::new()),
        }
    }

    /// Run the named command on `cron` (six-field, seconds first).
    ///
    /// Fails if the name is not in the service's catalog.
    pub fn with_task(mut self, name: &str, cron: impl Into<String>) -> Result<Self> {
        let canonical = self
            .service
            .catalog()
            .resolve(name)
            .ok_or_else(|| anyhow!("cannot schedule unknown command {name}"))?;
        self.tasks.push(ScheduledTask {
            name: canonical,
            cron: cron.into(),
        });
        Ok(self)
    }

    pub fn tasks(&self) -> &[ScheduledTask] {
        &self.tasks
    }

    pub fn last_execution(&self, name: &str) -> Option<DateTime<Utc>> {
        let canonical = self.service.catalog().resolve(name)?;
        self.last_executions.get(canonical).map(|t| *t)
    }

    /// Enqueue one scheduled task now.
    pub async fn publish(&self, name: &'static str) -> Vec<CommandRecord> {
        publish(&self.service, &self.last_executions, name).await
    }

    /// Record a completed execution of a scheduled task.
    pub fn observe(&self, event: &CommandEvent) {
        observe(&self.tasks, &self.last_executions, event);
    }

    /// Register every task with a cron scheduler and start it.
    ///
    /// Also spawns a listener that tracks completions from the event bus.
    pub async fn start(self) -> Result<(JobScheduler, JoinHandle<()>)> {
        let scheduler = JobScheduler::new()
            .await
            .context("failed to create cron scheduler")?;

        for task in &self.tasks {
            let service = self.service.clone();
            let last_executions = self.last_executions.clone();
            let name = task.name;
            let job = Job::new_async(task.cron.as_str(), move |_uuid, _lock| {
                let service = service.clone();
                let last_executions = last_executions.clone();
                Box::pin(async move {
                    let published = publish(&service, &last_executions, name).await;
                    debug!(command_name = name, count = published.len(), "scheduled task fired");
                })
            })
            .with_context(|| format!("invalid cron expression for {}: {}", task.name, task.cron))?;

            scheduler.add(job).await?;
        }

        let listener = spawn_listener(self.service.clone(), self.tasks.clone(), self.last_executions.clone());

        scheduler.start().await?;
        info!(tasks = self.tasks.len(), "command scheduler started");

        Ok((scheduler, listener))
    }
}

async fn publish(
    service: &CommandService,
    last_executions: &DashMap<&'static str, DateTime<Utc>>,
    name: &'static str,
) -> Vec<CommandRecord> {
    let last = last_executions.get(name).map(|t| *t);
    service
        .publish_scheduled(&[ScheduledCommand::new(name, last)])
        .await
}

fn observe(
    tasks: &[ScheduledTask],
    last_executions: &DashMap<&'static str, DateTime<Utc>>,
    event: &CommandEvent,
) {
    let CommandEvent::Executed(resource) = event else {
        return;
    };
    if resource.state != CommandStatus::Completed {
        return;
    }
    if let Some(task) = tasks.iter().find(|t| t.name == resource.name) {
        last_executions.insert(task.name, resource.state_change_time);
    }
}

fn spawn_listener(
    service: Arc<CommandService>,
    tasks: Vec<ScheduledTask>,
    last_executions: Arc<DashMap<&'static str, DateTime<Utc>>>,
) -> JoinHandle<()> {
    let mut receiver = service.events().subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => observe(&tasks, &last_executions, &event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "scheduler listener lagged behind command events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::catalog::CommandCatalog;
    use crate::command::Command;
    use crate::record::CommandTrigger;
    use crate::store::InMemoryCommandStore;

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct ApplicationUpdateCheck {}

    impl Command for ApplicationUpdateCheck {
        const NAME: &'static str = "ApplicationUpdateCheck";
    }

    fn scheduler() -> CommandScheduler {
        let catalog = CommandCatalog::new().with::<ApplicationUpdateCheck>().unwrap();
        let service = CommandService::new(Arc::new(InMemoryCommandStore::new()), catalog).into_shared();
        CommandScheduler::new(service)
            .with_task("ApplicationUpdateCheckCommand", "0 */5 * * * *")
            .unwrap()
    }

    #[test]
    fn unknown_task_names_are_rejected() {
        let service = CommandService::new(Arc::new(InMemoryCommandStore::new()), CommandCatalog::new());
        let result = CommandScheduler::new(service.into_shared()).with_task("Nope", "0 * * * * *");
        assert!(result.is_err());
    }

    #[test]
    fn task_names_are_canonicalised() {
        let scheduler = scheduler();
        assert_eq!(scheduler.tasks()[0].name, "ApplicationUpdateCheck");
    }

    #[tokio::test]
    async fn publish_enqueues_with_scheduled_trigger() {
        let scheduler = scheduler();
        let records = scheduler.publish("ApplicationUpdateCheck").await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].trigger, CommandTrigger::Scheduled);
        assert_eq!(records[0].last_execution_time, None);
    }

    #[tokio::test]
    async fn completion_is_carried_into_next_publish() {
        let scheduler = scheduler();
        let service = scheduler.service.clone();

        scheduler.publish("ApplicationUpdateCheck").await;
        let running = service.claim_next().await.unwrap().unwrap();
        let done = service.complete(&running).await.unwrap();
        scheduler.observe(&CommandEvent::executed(&done));

        assert_eq!(scheduler.last_execution("applicationupdatecheck"), done.ended_at);

        let next = scheduler.publish("ApplicationUpdateCheck").await;
        assert_eq!(next[0].last_execution_time, done.ended_at);
    }

    #[tokio::test]
    async fn failures_do_not_count_as_executions() {
        let scheduler = scheduler();
        let service = scheduler.service.clone();

        scheduler.publish("ApplicationUpdateCheck").await;
        let running = service.claim_next().await.unwrap().unwrap();
        let failed = service
            .fail(&running, &anyhow!("update server unreachable"))
            .await
            .unwrap();
        scheduler.observe(&CommandEvent::executed(&failed));

        assert_eq!(scheduler.last_execution("ApplicationUpdateCheck"), None);
    }
}
