//! History cleanup that runs through the queue like any other command.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::command::Command;
use crate::context::CommandContext;
use crate::record::CommandPriority;
use crate::registry::CommandHandler;

/// Hourly, on the hour.
pub const DEFAULT_PURGE_SCHEDULE: &str = "0 0 * * * *";

/// Delete terminal records past the service's retention window.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupCommandHistory {}

impl Command for CleanupCommandHistory {
    const NAME: &'static str = "CleanupCommandHistory";

    fn priority(&self) -> CommandPriority {
        CommandPriority::Low
    }
}

pub struct CleanupCommandHistoryHandler;

#[async_trait]
impl CommandHandler<CleanupCommandHistory> for CleanupCommandHistoryHandler {
    async fn execute(&self, _command: CleanupCommandHistory, ctx: CommandContext) -> anyhow::Result<()> {
        let purged = ctx.service().purge_history().await?;
        info!(purged, "command history cleanup finished");
        Ok(())
    }
}
