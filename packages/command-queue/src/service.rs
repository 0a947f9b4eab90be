//! Public enqueue / claim / lifecycle API.
//!
//! The service owns the mutual-exclusion contract: the dedup check plus
//! insert in `enqueue` and the claim in `claim_next` run under one lock, so
//! two identical submissions can never both end up in flight.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

use crate::catalog::{CommandCatalog, PreparedCommand};
use crate::command::{Command, EnqueueOptions};
use crate::dedup::find_duplicate;
use crate::error::Result;
use crate::events::{CommandEvent, CommandEventBus};
use crate::messages::MessageCache;
use crate::record::{CommandId, CommandRecord, CommandStatus, CommandTrigger, NewCommandRecord};
use crate::scheduled::ScheduledCommand;
use crate::store::CommandStore;

/// Default retention for terminal records, in hours.
pub const DEFAULT_RETENTION_HOURS: i64 = 24;

/// Result of a submission: the record plus whether it was newly queued.
#[derive(Debug, Clone)]
pub struct Submission {
    pub record: CommandRecord,
    /// False when an identical command was already in flight
    pub created: bool,
}

pub struct CommandService {
    store: Arc<dyn CommandStore>,
    catalog: CommandCatalog,
    events: CommandEventBus,
    messages: MessageCache,
    claim_lock: Mutex<()>,
    queued: Notify,
    retention: chrono::Duration,
    reconciled: AtomicBool,
}

impl CommandService {
    pub fn new(store: Arc<dyn CommandStore>, catalog: CommandCatalog) -> Self {
        Self {
            store,
            catalog,
            events: CommandEventBus::new(),
            messages: MessageCache::new(),
            claim_lock: Mutex::new(()),
            queued: Notify::new(),
            retention: chrono::Duration::hours(DEFAULT_RETENTION_HOURS),
            reconciled: AtomicBool::new(false),
        }
    }

    pub fn with_retention(mut self, retention: chrono::Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Share an existing bus, e.g. one the HTTP layer already subscribed to.
    pub fn with_events(mut self, events: CommandEventBus) -> Self {
        self.events = events;
        self
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn events(&self) -> &CommandEventBus {
        &self.events
    }

    pub fn catalog(&self) -> &CommandCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &Arc<dyn CommandStore> {
        &self.store
    }

    pub fn retention(&self) -> chrono::Duration {
        self.retention
    }

    /// Signal fired whenever a new record is queued.
    pub fn queued_signal(&self) -> &Notify {
        &self.queued
    }

    // ========================================================================
    // Submission
    // ========================================================================

    pub async fn enqueue<C: Command>(&self, command: C) -> Result<CommandRecord> {
        self.enqueue_with(command, EnqueueOptions::default()).await
    }

    pub async fn enqueue_with<C: Command>(
        &self,
        command: C,
        options: EnqueueOptions,
    ) -> Result<CommandRecord> {
        let prepared = PreparedCommand::new(&command)?;
        Ok(self.enqueue_prepared(prepared, options).await?.record)
    }

    /// Enqueue the default payload of a command resolved by logical name.
    pub async fn enqueue_by_name(
        &self,
        name: &str,
        options: EnqueueOptions,
    ) -> Result<CommandRecord> {
        let prepared = self.catalog.prepare_empty(name)?;
        Ok(self.enqueue_prepared(prepared, options).await?.record)
    }

    /// Enqueue a command from an external caller's name and JSON payload.
    ///
    /// Null or malformed payloads fail with `InvalidArgument` and nothing is
    /// persisted. A resubmission of in-flight work returns the existing record
    /// with `created` unset.
    pub async fn submit(
        &self,
        name: &str,
        payload: Value,
        trigger: CommandTrigger,
    ) -> Result<Submission> {
        let prepared = self.catalog.prepare_json(name, payload)?;
        let options = EnqueueOptions::builder().trigger(trigger).build();
        self.enqueue_prepared(prepared, options).await
    }

    /// Enqueue each scheduled task with `Trigger::Scheduled`.
    ///
    /// A task that fails to enqueue is logged and skipped; the others still run.
    pub async fn publish_scheduled(&self, tasks: &[ScheduledCommand]) -> Vec<CommandRecord> {
        let mut records = Vec::with_capacity(tasks.len());
        for task in tasks {
            let options = EnqueueOptions::scheduled(task.last_execution);
            match self.enqueue_by_name(&task.name, options).await {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(command_name = %task.name, error = %e, "failed to publish scheduled command");
                }
            }
        }
        records
    }

    async fn enqueue_prepared(
        &self,
        prepared: PreparedCommand,
        options: EnqueueOptions,
    ) -> Result<Submission> {
        let record = {
            let _guard = self.claim_lock.lock().await;

            let in_flight = self.store.find_queued_or_started(prepared.name).await?;
            if let Some(existing) = find_duplicate(&in_flight, &prepared.body, prepared.same_work) {
                debug!(
                    command_id = existing.id,
                    command_name = %existing.name,
                    status = %existing.status,
                    "identical command already in flight"
                );
                return Ok(Submission {
                    record: self.with_message(existing.clone()),
                    created: false,
                });
            }

            let new = NewCommandRecord {
                name: prepared.name.to_string(),
                body: prepared.body,
                priority: prepared.priority,
                trigger: options.trigger,
                send_updates_to_client: prepared.send_updates_to_client,
                last_execution_time: options.last_execution_time,
            };
            self.store.insert(new).await?
        };

        debug!(
            command_id = record.id,
            command_name = %record.name,
            priority = ?record.priority,
            trigger = ?record.trigger,
            "command queued"
        );

        self.events.emit(CommandEvent::queued(&record));
        self.queued.notify_waiters();

        Ok(Submission {
            record,
            created: true,
        })
    }

    // ========================================================================
    // Claiming and lifecycle
    // ========================================================================

    pub async fn claim_next(&self) -> Result<Option<CommandRecord>> {
        let claimed = {
            let _guard = self.claim_lock.lock().await;
            self.store.claim_next().await?
        };

        if let Some(record) = &claimed {
            self.messages.open(record);
            debug!(command_id = record.id, command_name = %record.name, "command claimed");
        }

        Ok(claimed)
    }

    pub async fn complete(&self, record: &CommandRecord) -> Result<CommandRecord> {
        let result = self
            .store
            .finish(record.id, CommandStatus::Completed, None)
            .await;
        self.messages.close(record.id);

        let finished = result?;
        info!(
            command_id = finished.id,
            command_name = %finished.name,
            duration_ms = finished.duration().map(|d| d.num_milliseconds()),
            "command completed"
        );
        Ok(finished)
    }

    /// Mark a running record Failed, storing the full cause chain of `error`.
    pub async fn fail(&self, record: &CommandRecord, error: &anyhow::Error) -> Result<CommandRecord> {
        let exception = format!("{error:#}");
        let result = self
            .store
            .finish(record.id, CommandStatus::Failed, Some(exception))
            .await;
        self.messages.close(record.id);

        let finished = result?;
        info!(
            command_id = finished.id,
            command_name = %finished.name,
            duration_ms = finished.duration().map(|d| d.num_milliseconds()),
            "command failed"
        );
        Ok(finished)
    }

    /// Cancel a Queued record. Returns false if it already started or ended.
    pub async fn cancel(&self, id: CommandId) -> Result<bool> {
        let cancelled = {
            let _guard = self.claim_lock.lock().await;
            self.store.cancel_queued(id).await?
        };

        if cancelled {
            let record = self.store.get(id).await?;
            info!(command_id = id, command_name = %record.name, "command cancelled");
            self.events.emit(CommandEvent::executed(&record));
        }

        Ok(cancelled)
    }

    /// Move records left Started by a previous process to Orphaned.
    ///
    /// Only the first call on a service instance touches the store.
    pub async fn reconcile_on_startup(&self) -> Result<u64> {
        if self
            .reconciled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(0);
        }

        match self.store.mark_orphaned().await {
            Ok(count) => {
                if count > 0 {
                    warn!(count, "marked commands from a previous run as orphaned");
                } else {
                    info!("no orphaned commands found");
                }
                Ok(count)
            }
            Err(e) => {
                self.reconciled.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Delete terminal records older than the retention window.
    pub async fn purge_history(&self) -> Result<u64> {
        let cutoff = Utc::now() - self.retention;
        let purged = self.store.purge(cutoff).await?;
        info!(purged, cutoff = %cutoff, "purged command history");
        Ok(purged)
    }

    // ========================================================================
    // Observation and progress
    // ========================================================================

    pub async fn get(&self, id: CommandId) -> Result<CommandRecord> {
        let record = self.store.get(id).await?;
        Ok(self.with_message(record))
    }

    pub async fn get_running(&self) -> Result<Vec<CommandRecord>> {
        let records = self.store.find_by_status(CommandStatus::Started).await?;
        Ok(records.into_iter().map(|r| self.with_message(r)).collect())
    }

    /// Update the transient message of a running record without notifying.
    ///
    /// Returns false if the record is not running in this process.
    pub fn set_message(&self, id: CommandId, message: impl Into<String>) -> bool {
        self.messages.set(id, message).is_some()
    }

    /// Update the message and emit `Updated` when the record asks for it.
    pub fn report_progress(&self, id: CommandId, message: impl Into<String>) -> bool {
        match self.messages.set(id, message) {
            Some(snapshot) => {
                if snapshot.send_updates_to_client {
                    self.events.emit(CommandEvent::updated(&snapshot));
                }
                true
            }
            None => false,
        }
    }

    fn with_message(&self, mut record: CommandRecord) -> CommandRecord {
        if record.status == CommandStatus::Started {
            record.message = self.messages.get(record.id);
        }
        record
    }
}

impl std::fmt::Debug for CommandService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandService")
            .field("commands", &self.catalog.names())
            .field("running", &self.messages.len())
            .field("retention", &self.retention)
            .finish_non_exhaustive()
    }
}
