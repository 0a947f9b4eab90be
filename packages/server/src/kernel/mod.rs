//! Command queue wiring for the server process.
//!
//! Every command the API accepts must appear in [`command_catalog`], and
//! every catalog entry needs a handler in [`handler_registry`]; a command
//! without one is accepted, then fails when a worker claims it.

pub mod scheduled_tasks;

use std::sync::Arc;

use command_queue::{
    CleanupCommandHistory, CleanupCommandHistoryHandler, CommandCatalog, CommandQueueConfig,
    CommandService, CommandStore, HandlerRegistry,
};

pub use scheduled_tasks::start_scheduler;

/// Commands the server accepts by name.
pub fn command_catalog() -> command_queue::Result<CommandCatalog> {
    CommandCatalog::new().with::<CleanupCommandHistory>()
}

/// Handlers for every command in [`command_catalog`].
pub fn handler_registry() -> command_queue::Result<HandlerRegistry> {
    let mut registry = HandlerRegistry::new();
    registry.register_handler::<CleanupCommandHistory, _>(CleanupCommandHistoryHandler)?;
    Ok(registry)
}

/// Build the shared command service over `store`.
pub fn build_service(
    store: Arc<dyn CommandStore>,
    config: &CommandQueueConfig,
) -> command_queue::Result<Arc<CommandService>> {
    let service = CommandService::new(store, command_catalog()?)
        .with_retention(config.retention)
        .into_shared();
    Ok(service)
}
