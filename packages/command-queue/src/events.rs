//! Lifecycle notifications for observers.
//!
//! # Guarantees
//!
//! - **At-most-once delivery**: slow receivers may miss events
//! - **In-memory only**: events are not persisted
//! - **No replay**: lagged receivers get `RecvError::Lagged`
//!
//! The store remains the source of truth; events only carry snapshots.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::record::{CommandRecord, CommandResource};

/// Default channel capacity for the event bus.
const DEFAULT_CAPACITY: usize = 1024;

/// A record snapshot tagged with what just happened to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "command", rename_all = "snake_case")]
pub enum CommandEvent {
    /// A new record was inserted.
    Queued(CommandResource),
    /// A running record changed status or progress message.
    Updated(CommandResource),
    /// A record reached a terminal status.
    Executed(CommandResource),
}

impl CommandEvent {
    pub fn queued(record: &CommandRecord) -> Self {
        Self::Queued(record.into())
    }

    pub fn updated(record: &CommandRecord) -> Self {
        Self::Updated(record.into())
    }

    pub fn executed(record: &CommandRecord) -> Self {
        Self::Executed(record.into())
    }

    pub fn resource(&self) -> &CommandResource {
        match self {
            Self::Queued(r) | Self::Updated(r) | Self::Executed(r) => r,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Queued(_) => "queued",
            Self::Updated(_) => "updated",
            Self::Executed(_) => "executed",
        }
    }
}

/// Broadcast bus for [`CommandEvent`]s.
#[derive(Clone)]
pub struct CommandEventBus {
    sender: broadcast::Sender<CommandEvent>,
}

impl CommandEventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit to all subscribers (fire-and-forget).
    ///
    /// Returns the number of receivers that got the event.
    pub fn emit(&self, event: CommandEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CommandEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for CommandEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CommandEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandEventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::record::NewCommandRecord;

    fn sample_record() -> CommandRecord {
        let new = NewCommandRecord::builder()
            .name("RssSync")
            .body(json!({}))
            .send_updates_to_client(true)
            .build();
        CommandRecord::queued(11, new, Utc::now())
    }

    #[test]
    fn emit_without_subscribers_returns_zero() {
        let bus = CommandEventBus::new();
        assert_eq!(bus.emit(CommandEvent::queued(&sample_record())), 0);
    }

    #[tokio::test]
    async fn subscribers_receive_events() {
        let bus = CommandEventBus::new();
        let mut rx = bus.subscribe();

        assert_eq!(bus.emit(CommandEvent::updated(&sample_record())), 1);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind(), "updated");
        assert_eq!(event.resource().id, 11);
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let json = serde_json::to_value(CommandEvent::executed(&sample_record())).unwrap();
        assert_eq!(json["type"], "executed");
        assert_eq!(json["command"]["name"], "RssSync");
        assert_eq!(json["command"]["sendUpdatesToClient"], true);
    }

    #[test]
    fn debug_shows_subscriber_count() {
        let bus = CommandEventBus::new();
        let _rx = bus.subscribe();
        assert!(format!("{bus:?}").contains("subscriber_count: 1"));
    }
}
