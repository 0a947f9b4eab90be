//! In-process store for embedded use and tests.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;

use super::{CommandStore, ensure_finish_target};
use crate::error::{CommandError, Result};
use crate::record::{CommandId, CommandRecord, CommandStatus, NewCommandRecord};

#[derive(Default)]
struct Inner {
    next_id: CommandId,
    records: BTreeMap<CommandId, CommandRecord>,
}

/// Mutex-guarded map of records keyed by id.
///
/// Ids are assigned in insertion order, so iterating the map yields records
/// in the order they were queued.
#[derive(Default)]
pub struct InMemoryCommandStore {
    inner: Mutex<Inner>,
}

impl InMemoryCommandStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, any status.
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("command store mutex was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn collect<F>(&self, predicate: F) -> Vec<CommandRecord>
    where
        F: Fn(&CommandRecord) -> bool,
    {
        self.lock()
            .records
            .values()
            .filter(|record| predicate(record))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CommandStore for InMemoryCommandStore {
    async fn insert(&self, new: NewCommandRecord) -> Result<CommandRecord> {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        let record = CommandRecord::queued(id, new, Utc::now());
        inner.records.insert(id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: CommandId) -> Result<CommandRecord> {
        self.lock()
            .records
            .get(&id)
            .cloned()
            .ok_or(CommandError::RecordNotFound(id))
    }

    async fn find_by_name(&self, name: &str) -> Result<Vec<CommandRecord>> {
        Ok(self.collect(|r| r.name == name))
    }

    async fn find_queued_or_started(&self, name: &str) -> Result<Vec<CommandRecord>> {
        Ok(self.collect(|r| r.name == name && r.status.is_active()))
    }

    async fn find_by_status(&self, status: CommandStatus) -> Result<Vec<CommandRecord>> {
        Ok(self.collect(|r| r.status == status))
    }

    async fn claim_next(&self) -> Result<Option<CommandRecord>> {
        let mut inner = self.lock();

        // Ties on priority and queued_at fall back to id, i.e. insertion order.
        let next = inner
            .records
            .values()
            .filter(|r| r.status == CommandStatus::Queued)
            .min_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then(a.queued_at.cmp(&b.queued_at))
                    .then(a.id.cmp(&b.id))
            })
            .map(|r| r.id);

        let Some(id) = next else {
            return Ok(None);
        };

        let record = inner
            .records
            .get_mut(&id)
            .ok_or(CommandError::RecordNotFound(id))?;
        record.status = CommandStatus::Started;
        record.started_at = Some(Utc::now());
        Ok(Some(record.clone()))
    }

    async fn finish(
        &self,
        id: CommandId,
        status: CommandStatus,
        exception: Option<String>,
    ) -> Result<CommandRecord> {
        ensure_finish_target(id, status)?;

        let mut inner = self.lock();
        let record = inner
            .records
            .get_mut(&id)
            .ok_or(CommandError::RecordNotFound(id))?;

        if record.status != CommandStatus::Started {
            return Err(CommandError::InvalidTransition {
                id,
                from: record.status,
                to: status,
            });
        }

        record.status = status;
        record.ended_at = Some(Utc::now());
        record.exception = exception;
        Ok(record.clone())
    }

    async fn cancel_queued(&self, id: CommandId) -> Result<bool> {
        let mut inner = self.lock();
        match inner.records.get_mut(&id) {
            Some(record) if record.status == CommandStatus::Queued => {
                record.status = CommandStatus::Cancelled;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(CommandError::RecordNotFound(id)),
        }
    }

    async fn mark_orphaned(&self) -> Result<u64> {
        let mut inner = self.lock();
        let mut count = 0;
        for record in inner.records.values_mut() {
            if record.status == CommandStatus::Started {
                record.status = CommandStatus::Orphaned;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn purge(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.lock();
        let before = inner.records.len();
        inner
            .records
            .retain(|_, r| r.status.is_active() || r.status_changed_at() >= older_than);
        Ok((before - inner.records.len()) as u64)
    }
}
