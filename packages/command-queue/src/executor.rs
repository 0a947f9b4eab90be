//! Fixed-size worker pool that claims and runs commands.
//!
//! ```text
//! CommandExecutor::start
//!     │
//!     ├─► CommandService::reconcile_on_startup   (Started → Orphaned)
//!     └─► N × worker loop
//!             ├─► claim_next (under the service's claim lock)
//!             ├─► HandlerRegistry::dispatch → handler future
//!             │       └─► runs inside a CommandScope (progress attribution)
//!             └─► complete / fail → Updated + Executed events
//! ```
//!
//! A worker never dies from a command failure: handler errors and panics
//! become Failed records, and plumbing errors are logged and retried after
//! a short backoff.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::context::CommandContext;
use crate::error::Result;
use crate::events::CommandEvent;
use crate::progress::{self, CommandScope};
use crate::record::CommandRecord;
use crate::registry::HandlerRegistry;
use crate::service::CommandService;

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Number of concurrent workers
    pub worker_count: usize,
    /// Fallback poll when no queued-notification arrives
    pub poll_interval: Duration,
    /// Pause after a claim or bookkeeping error
    pub error_backoff: Duration,
    /// How long `shutdown` waits for in-flight commands
    pub shutdown_timeout: Duration,
    /// Prefix for worker ids in logs
    pub executor_id: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            worker_count: 3,
            poll_interval: Duration::from_millis(500),
            error_backoff: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(30),
            executor_id: format!("executor-{}", Uuid::new_v4()),
        }
    }
}

pub struct CommandExecutor {
    service: Arc<CommandService>,
    registry: Arc<HandlerRegistry>,
    config: ExecutorConfig,
}

impl CommandExecutor {
    pub fn new(service: Arc<CommandService>, registry: HandlerRegistry) -> Self {
        Self {
            service,
            registry: Arc::new(registry),
            config: ExecutorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Reconcile orphans, then spawn the workers.
    pub async fn start(self) -> Result<ExecutorHandle> {
        self.service.reconcile_on_startup().await?;

        let shutdown = CancellationToken::new();
        let worker_count = self.config.worker_count.max(1);
        let mut workers = Vec::with_capacity(worker_count);

        for index in 0..worker_count {
            let worker = Worker {
                id: format!("{}-{}", self.config.executor_id, index),
                service: self.service.clone(),
                registry: self.registry.clone(),
                config: self.config.clone(),
                shutdown: shutdown.clone(),
            };
            workers.push(tokio::spawn(worker.run()));
        }

        info!(
            executor_id = %self.config.executor_id,
            workers = worker_count,
            handlers = ?self.registry.names(),
            "command executor started"
        );

        Ok(ExecutorHandle {
            shutdown,
            workers,
            shutdown_timeout: self.config.shutdown_timeout,
        })
    }
}

/// Owner of a running worker pool.
pub struct ExecutorHandle {
    shutdown: CancellationToken,
    workers: Vec<JoinHandle<()>>,
    shutdown_timeout: Duration,
}

impl ExecutorHandle {
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop claiming, let in-flight commands finish, and join the workers.
    ///
    /// Workers still running after the timeout are aborted.
    pub async fn shutdown(self) {
        self.shutdown.cancel();

        let mut workers = self.workers;
        let joined = tokio::time::timeout(
            self.shutdown_timeout,
            futures::future::join_all(workers.iter_mut()),
        )
        .await;

        match joined {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        error!(error = %e, "command worker exited abnormally");
                    }
                }
                info!("command executor stopped");
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.shutdown_timeout.as_secs(),
                    "command workers did not stop in time, aborting"
                );
                for worker in &workers {
                    worker.abort();
                }
            }
        }
    }
}

struct Worker {
    id: String,
    service: Arc<CommandService>,
    registry: Arc<HandlerRegistry>,
    config: ExecutorConfig,
    shutdown: CancellationToken,
}

impl Worker {
    async fn run(self) {
        debug!(worker = %self.id, "command worker starting");

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            // Register interest before claiming so an enqueue that lands
            // between an empty claim and the wait still wakes us.
            let notified = self.service.queued_signal().notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.service.claim_next().await {
                Ok(Some(record)) => self.execute(record).await,
                Ok(None) => {
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = &mut notified => {}
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
                Err(e) => {
                    error!(worker = %self.id, error = %e, "failed to claim command");
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.config.error_backoff) => {}
                    }
                }
            }
        }

        debug!(worker = %self.id, "command worker stopped");
    }

    async fn execute(&self, record: CommandRecord) {
        let span = info_span!(
            "command",
            command_id = record.id,
            command_name = %record.name,
            worker = %self.id
        );

        async {
            let events = self.service.events();
            if record.send_updates_to_client {
                events.emit(CommandEvent::updated(&record));
            }

            let outcome = self.run_handler(&record).await;

            let finished = match outcome {
                Ok(()) => self.service.complete(&record).await,
                Err(e) => {
                    warn!(error = %format!("{e:#}"), "command failed");
                    self.service.fail(&record, &e).await
                }
            };

            match finished {
                Ok(done) => {
                    if done.send_updates_to_client {
                        events.emit(CommandEvent::updated(&done));
                    }
                    events.emit(CommandEvent::executed(&done));
                }
                Err(e) => {
                    error!(error = %e, "failed to record command outcome");
                    tokio::time::sleep(self.config.error_backoff).await;
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_handler(&self, record: &CommandRecord) -> anyhow::Result<()> {
        let ctx = CommandContext::new(record.clone(), self.service.clone(), self.shutdown.clone());

        let handler = match self.registry.dispatch(record, ctx) {
            Ok(handler) => handler,
            Err(e) => {
                error!(error = %e, "command has no handler");
                return Err(e.into());
            }
        };

        let scope = CommandScope {
            id: record.id,
            send_updates_to_client: record.send_updates_to_client,
        };

        match AssertUnwindSafe(progress::scope(scope, handler))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => Err(anyhow!("command handler panicked: {}", panic_message(&panic))),
        }
    }
}

pub(crate) fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
