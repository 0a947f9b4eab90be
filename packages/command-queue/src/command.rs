//! The unit of work callers submit.

use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use typed_builder::TypedBuilder;

use crate::record::{CommandPriority, CommandTrigger};

/// A named, serializable payload that a handler knows how to execute.
///
/// The payload is immutable once enqueued; submission metadata (trigger,
/// last execution time) travels separately in [`EnqueueOptions`].
///
/// # Example
///
/// ```
/// use command_queue::Command;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Default, Serialize, Deserialize)]
/// struct RefreshSeries {
///     series_id: Option<i64>,
/// }
///
/// impl Command for RefreshSeries {
///     const NAME: &'static str = "RefreshSeries";
///
///     fn send_updates_to_client(&self) -> bool {
///         true
///     }
/// }
/// ```
pub trait Command: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Name stored on the record and used for dispatch and deduplication.
    const NAME: &'static str;

    /// Whether observers should receive progress for this command.
    fn send_updates_to_client(&self) -> bool {
        false
    }

    fn priority(&self) -> CommandPriority {
        CommandPriority::Normal
    }

    /// Whether `other` denotes the same work as `self`.
    ///
    /// Must be reflexive and symmetric. The default compares the serialized
    /// payloads structurally.
    fn is_same_work(&self, other: &Self) -> bool {
        match (serde_json::to_value(self), serde_json::to_value(other)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

/// Submission metadata persisted alongside the payload.
#[derive(Debug, Clone, Default, PartialEq, TypedBuilder)]
pub struct EnqueueOptions {
    #[builder(default)]
    pub trigger: CommandTrigger,
    #[builder(default, setter(strip_option))]
    pub last_execution_time: Option<DateTime<Utc>>,
}

impl EnqueueOptions {
    pub fn manual() -> Self {
        Self::builder().trigger(CommandTrigger::Manual).build()
    }

    pub fn scheduled(last_execution_time: Option<DateTime<Utc>>) -> Self {
        Self {
            trigger: CommandTrigger::Scheduled,
            last_execution_time,
        }
    }
}
