use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::record::{CommandId, CommandRecord};
use crate::service::CommandService;

/// Handle passed to a handler alongside its payload.
#[derive(Clone)]
pub struct CommandContext {
    record: CommandRecord,
    service: Arc<CommandService>,
    shutdown: CancellationToken,
}

impl CommandContext {
    pub fn new(record: CommandRecord, service: Arc<CommandService>, shutdown: CancellationToken) -> Self {
        Self {
            record,
            service,
            shutdown,
        }
    }

    pub fn id(&self) -> CommandId {
        self.record.id
    }

    /// Snapshot of the record as it was claimed.
    pub fn record(&self) -> &CommandRecord {
        &self.record
    }

    /// The owning service, for handlers that enqueue follow-up work.
    pub fn service(&self) -> &Arc<CommandService> {
        &self.service
    }

    /// Publish a progress message for this command.
    ///
    /// Returns false once the command has finished.
    pub fn report_progress(&self, message: impl Into<String>) -> bool {
        self.service.report_progress(self.record.id, message)
    }

    /// Whether the executor is shutting down. Long handlers may check this
    /// and return early; nothing forces them to.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }
}

impl std::fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandContext")
            .field("id", &self.record.id)
            .field("name", &self.record.name)
            .finish_non_exhaustive()
    }
}
