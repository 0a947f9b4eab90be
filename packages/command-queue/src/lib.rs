//! Durable command queue.
//!
//! Callers enqueue typed [`Command`]s; a bounded pool of workers claims them
//! in priority order, runs the registered handler, and records the outcome.
//! Identical in-flight work is deduplicated, and running commands can stream
//! progress to observers.
//!
//! # Architecture
//!
//! ```text
//! caller ──► CommandService::enqueue ──► CommandStore (Queued)
//!                                              │
//!            CommandExecutor worker ◄── claim_next (Started)
//!                   │
//!                   ├─► HandlerRegistry::dispatch ─► handler
//!                   │        └─► tracing (progress = ..) ─► ProgressLayer
//!                   └─► complete / fail ──► CommandStore (Completed / Failed)
//!
//! CommandEventBus: Queued, Updated, Executed
//! ```
//!
//! # Example
//!
//! ```ignore
//! let catalog = CommandCatalog::new().with::<RefreshSeries>()?;
//! let service = CommandService::new(Arc::new(InMemoryCommandStore::new()), catalog).into_shared();
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register::<RefreshSeries, _, _>(|cmd, ctx| async move {
//!     tracing::info!(progress = true, "Refreshing series {:?}", cmd.series_id);
//!     Ok(())
//! })?;
//!
//! let handle = CommandExecutor::new(service.clone(), registry).start().await?;
//! service.enqueue(RefreshSeries { series_id: Some(4) }).await?;
//! // ...
//! handle.shutdown().await;
//! ```

pub mod catalog;
pub mod command;
pub mod config;
pub mod context;
pub mod dedup;
pub mod error;
pub mod events;
pub mod executor;
pub mod housekeeping;
pub mod messages;
pub mod progress;
pub mod record;
pub mod registry;
pub mod scheduled;
pub mod service;
pub mod store;

pub use catalog::{CommandCatalog, PreparedCommand};
pub use command::{Command, EnqueueOptions};
pub use config::CommandQueueConfig;
pub use context::CommandContext;
pub use error::{CommandError, Result};
pub use events::{CommandEvent, CommandEventBus};
pub use executor::{CommandExecutor, ExecutorConfig, ExecutorHandle};
pub use housekeeping::{CleanupCommandHistory, CleanupCommandHistoryHandler};
pub use progress::{CommandScope, ProgressBroadcast, ProgressLayer};
pub use record::{
    CommandId, CommandPriority, CommandRecord, CommandResource, CommandStatus, CommandTrigger,
    NewCommandRecord,
};
pub use registry::{CommandHandler, HandlerRegistry};
pub use scheduled::{CommandScheduler, ScheduledCommand, ScheduledTask};
pub use service::{CommandService, Submission};
pub use store::{CommandStore, InMemoryCommandStore, PostgresCommandStore};
