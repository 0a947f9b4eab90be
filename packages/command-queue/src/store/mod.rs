//! Durable persistence of command records.
//!
//! The store is the single source of truth for status. Records only change
//! status through `insert`, `claim_next`, `finish`, `cancel_queued` and
//! `mark_orphaned`.

mod memory;
mod postgres;

pub use memory::InMemoryCommandStore;
pub use postgres::PostgresCommandStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::record::{CommandId, CommandRecord, CommandStatus, NewCommandRecord};

#[async_trait]
pub trait CommandStore: Send + Sync {
    /// Persist a new record as Queued, assigning its id and `queued_at`.
    async fn insert(&self, new: NewCommandRecord) -> Result<CommandRecord>;

    /// Fetch one record, or `RecordNotFound`.
    async fn get(&self, id: CommandId) -> Result<CommandRecord>;

    /// All records with this name, any status.
    async fn find_by_name(&self, name: &str) -> Result<Vec<CommandRecord>>;

    /// Records with this name that are Queued or Started right now.
    async fn find_queued_or_started(&self, name: &str) -> Result<Vec<CommandRecord>>;

    async fn find_by_status(&self, status: CommandStatus) -> Result<Vec<CommandRecord>>;

    /// Atomically move the best Queued record to Started.
    ///
    /// Best means highest priority, then earliest `queued_at`, then lowest id.
    /// Two concurrent callers never receive the same record.
    async fn claim_next(&self) -> Result<Option<CommandRecord>>;

    /// Move a Started record to Completed or Failed, stamping `ended_at`.
    async fn finish(
        &self,
        id: CommandId,
        status: CommandStatus,
        exception: Option<String>,
    ) -> Result<CommandRecord>;

    /// Move a Queued record to Cancelled. Returns false if it was not Queued.
    async fn cancel_queued(&self, id: CommandId) -> Result<bool>;

    /// Move every Started record to Orphaned. Returns how many changed.
    async fn mark_orphaned(&self) -> Result<u64>;

    /// Delete terminal records whose last transition is before `older_than`.
    async fn purge(&self, older_than: DateTime<Utc>) -> Result<u64>;
}

/// Statuses `finish` may write.
pub(crate) fn ensure_finish_target(id: CommandId, status: CommandStatus) -> Result<()> {
    match status {
        CommandStatus::Completed | CommandStatus::Failed => Ok(()),
        to => Err(crate::error::CommandError::InvalidTransition {
            id,
            from: CommandStatus::Started,
            to,
        }),
    }
}
