//! Transient progress messages for running commands.

use dashmap::DashMap;

use crate::record::{CommandId, CommandRecord};

/// Latest progress text per running record, next to the record snapshot
/// taken when it was claimed.
///
/// An entry exists only between `open` (on claim) and `close` (on a terminal
/// transition). `set` ignores records without an entry, so a progress signal
/// that arrives after completion can't resurrect a stale message.
#[derive(Debug, Default)]
pub struct MessageCache {
    running: DashMap<CommandId, CommandRecord>,
}

impl MessageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, record: &CommandRecord) {
        let mut snapshot = record.clone();
        snapshot.message = None;
        self.running.insert(record.id, snapshot);
    }

    /// Store `message` and return the updated snapshot, or `None` if the
    /// record is not running.
    pub fn set(&self, id: CommandId, message: impl Into<String>) -> Option<CommandRecord> {
        let mut entry = self.running.get_mut(&id)?;
        entry.message = Some(message.into());
        Some(entry.value().clone())
    }

    pub fn get(&self, id: CommandId) -> Option<String> {
        self.running.get(&id).and_then(|entry| entry.message.clone())
    }

    pub fn close(&self, id: CommandId) {
        self.running.remove(&id);
    }

    pub fn is_open(&self, id: CommandId) -> bool {
        self.running.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.running.is_empty()
    }
}
