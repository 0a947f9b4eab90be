//! Persisted command record and its lifecycle enums.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;

// ============================================================================
// Enums
// ============================================================================

pub type CommandId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "command_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    #[default]
    Queued,
    Started,
    Completed,
    Failed,
    Aborted,
    Cancelled,
    Orphaned,
}

impl CommandStatus {
    /// Queued and Started records are still "in flight" for deduplication.
    pub fn is_active(&self) -> bool {
        matches!(self, CommandStatus::Queued | CommandStatus::Started)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    /// Statuses for which `started_at` must be set.
    pub fn has_started(&self) -> bool {
        matches!(
            self,
            CommandStatus::Started
                | CommandStatus::Completed
                | CommandStatus::Failed
                | CommandStatus::Orphaned
        )
    }

    /// Statuses for which `ended_at` must be set.
    pub fn has_ended(&self) -> bool {
        matches!(self, CommandStatus::Completed | CommandStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandStatus::Queued => "queued",
            CommandStatus::Started => "started",
            CommandStatus::Completed => "completed",
            CommandStatus::Failed => "failed",
            CommandStatus::Aborted => "aborted",
            CommandStatus::Cancelled => "cancelled",
            CommandStatus::Orphaned => "orphaned",
        }
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored as SMALLINT so `ORDER BY priority DESC` puts High first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type, Default,
)]
#[repr(i16)]
#[serde(rename_all = "snake_case")]
pub enum CommandPriority {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "command_trigger", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CommandTrigger {
    #[default]
    Unspecified,
    Manual,
    Scheduled,
}

// ============================================================================
// Record
// ============================================================================

/// A command as persisted by the store.
///
/// `message` is transient progress text filled in by the service from its
/// cache; it is never written to storage.
#[derive(FromRow, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub id: CommandId,
    pub name: String,
    pub body: serde_json::Value,
    pub priority: CommandPriority,
    pub status: CommandStatus,
    pub trigger: CommandTrigger,
    pub send_updates_to_client: bool,
    pub last_execution_time: Option<DateTime<Utc>>,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub exception: Option<String>,
    #[sqlx(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CommandRecord {
    /// Build the record a store persists for a new submission.
    pub(crate) fn queued(id: CommandId, new: NewCommandRecord, queued_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name: new.name,
            body: new.body,
            priority: new.priority,
            status: CommandStatus::Queued,
            trigger: new.trigger,
            send_updates_to_client: new.send_updates_to_client,
            last_execution_time: new.last_execution_time,
            queued_at,
            started_at: None,
            ended_at: None,
            exception: None,
            message: None,
        }
    }

    /// Time spent executing, once the record has ended.
    pub fn duration(&self) -> Option<Duration> {
        match (self.started_at, self.ended_at) {
            (Some(started), Some(ended)) => Some(ended - started),
            _ => None,
        }
    }

    /// Latest moment the status changed.
    pub fn status_changed_at(&self) -> DateTime<Utc> {
        self.ended_at
            .or(self.started_at)
            .unwrap_or(self.queued_at)
    }

    /// Checks the timestamp/status invariant.
    pub fn timestamps_consistent(&self) -> bool {
        self.started_at.is_some() == self.status.has_started()
            && self.ended_at.is_some() == self.status.has_ended()
    }
}

/// Values a caller supplies when inserting a record; the store assigns the rest.
#[derive(Debug, Clone, PartialEq, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct NewCommandRecord {
    pub name: String,
    pub body: serde_json::Value,
    #[builder(default)]
    pub priority: CommandPriority,
    #[builder(default)]
    pub trigger: CommandTrigger,
    #[builder(default = false)]
    pub send_updates_to_client: bool,
    #[builder(default, setter(strip_option))]
    pub last_execution_time: Option<DateTime<Utc>>,
}

// ============================================================================
// Observation shape
// ============================================================================

/// Client-facing view of a record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResource {
    pub id: CommandId,
    pub name: String,
    pub message: Option<String>,
    pub started_on: DateTime<Utc>,
    pub state_change_time: DateTime<Utc>,
    pub send_updates_to_client: bool,
    pub state: CommandStatus,
    pub last_execution_time: Option<DateTime<Utc>>,
    pub manual: bool,
    pub trigger: CommandTrigger,
}

impl From<&CommandRecord> for CommandResource {
    fn from(record: &CommandRecord) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            message: record.message.clone(),
            started_on: record.queued_at,
            state_change_time: record.status_changed_at(),
            send_updates_to_client: record.send_updates_to_client,
            state: record.status,
            last_execution_time: record.last_execution_time,
            manual: record.trigger == CommandTrigger::Manual,
            trigger: record.trigger,
        }
    }
}

impl From<CommandRecord> for CommandResource {
    fn from(record: CommandRecord) -> Self {
        Self::from(&record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> CommandRecord {
        let new = NewCommandRecord::builder()
            .name("RefreshSeries")
            .body(serde_json::json!({ "series_id": 4 }))
            .build();
        CommandRecord::queued(1, new, Utc::now())
    }

    #[test]
    fn new_record_is_queued_with_no_timestamps() {
        let record = sample_record();
        assert_eq!(record.status, CommandStatus::Queued);
        assert!(record.started_at.is_none());
        assert!(record.ended_at.is_none());
        assert!(record.duration().is_none());
        assert!(record.timestamps_consistent());
    }

    #[test]
    fn new_record_defaults_to_normal_priority_and_unspecified_trigger() {
        let record = sample_record();
        assert_eq!(record.priority, CommandPriority::Normal);
        assert_eq!(record.trigger, CommandTrigger::Unspecified);
        assert!(!record.send_updates_to_client);
    }

    #[test]
    fn priority_ordering_puts_high_first() {
        assert!(CommandPriority::High > CommandPriority::Normal);
        assert!(CommandPriority::Normal > CommandPriority::Low);
    }

    #[test]
    fn only_queued_and_started_are_active() {
        assert!(CommandStatus::Queued.is_active());
        assert!(CommandStatus::Started.is_active());
        for status in [
            CommandStatus::Completed,
            CommandStatus::Failed,
            CommandStatus::Aborted,
            CommandStatus::Cancelled,
            CommandStatus::Orphaned,
        ] {
            assert!(status.is_terminal(), "{status} should be terminal");
        }
    }

    #[test]
    fn duration_is_end_minus_start() {
        let mut record = sample_record();
        let started = Utc::now();
        record.status = CommandStatus::Completed;
        record.started_at = Some(started);
        record.ended_at = Some(started + Duration::milliseconds(1500));

        assert_eq!(record.duration(), Some(Duration::milliseconds(1500)));
        assert!(record.timestamps_consistent());
    }

    #[test]
    fn orphaned_without_start_is_inconsistent() {
        let mut record = sample_record();
        record.status = CommandStatus::Orphaned;
        assert!(!record.timestamps_consistent());
    }

    #[test]
    fn resource_uses_camel_case_and_lowercase_state() {
        let mut record = sample_record();
        record.trigger = CommandTrigger::Manual;
        record.message = Some("Scanning".into());

        let json = serde_json::to_value(CommandResource::from(&record)).unwrap();
        assert_eq!(json["state"], "queued");
        assert_eq!(json["manual"], true);
        assert_eq!(json["sendUpdatesToClient"], false);
        assert_eq!(json["message"], "Scanning");
        assert!(json.get("startedOn").is_some());
        assert!(json.get("stateChangeTime").is_some());
    }

    #[test]
    fn status_changed_at_tracks_latest_transition() {
        let mut record = sample_record();
        assert_eq!(record.status_changed_at(), record.queued_at);

        let started = record.queued_at + Duration::seconds(2);
        record.started_at = Some(started);
        assert_eq!(record.status_changed_at(), started);
    }
}
