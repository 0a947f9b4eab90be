//! Deciding whether a new submission duplicates in-flight work.

use std::panic::{AssertUnwindSafe, catch_unwind};

use anyhow::{Context, anyhow};
use serde_json::Value;
use tracing::warn;

use crate::command::Command;
use crate::executor::panic_message;
use crate::record::CommandRecord;

/// Type-erased equality check between two stored bodies of one command type.
pub type SameWorkFn = fn(&Value, &Value) -> anyhow::Result<bool>;

/// Compare two bodies as `C`.
///
/// Both directions of `is_same_work` must agree, so a lopsided override can't
/// make the relation asymmetric. A panicking override is reported as an error.
pub fn same_work<C: Command>(existing: &Value, candidate: &Value) -> anyhow::Result<bool> {
    let existing: C = serde_json::from_value(existing.clone())
        .with_context(|| format!("stored body is not a valid {}", C::NAME))?;
    let candidate: C = serde_json::from_value(candidate.clone())
        .with_context(|| format!("submitted body is not a valid {}", C::NAME))?;

    catch_unwind(AssertUnwindSafe(|| {
        existing.is_same_work(&candidate) && candidate.is_same_work(&existing)
    }))
    .map_err(|panic| anyhow!("{} is_same_work panicked: {}", C::NAME, panic_message(&panic)))
}

/// First in-flight record whose body is the same work as `body`.
///
/// A comparison that errors counts as "not the same" and is logged.
pub fn find_duplicate<'a>(
    in_flight: &'a [CommandRecord],
    body: &Value,
    same_work: SameWorkFn,
) -> Option<&'a CommandRecord> {
    in_flight.iter().find(|record| {
        if !record.status.is_active() {
            return false;
        }
        match same_work(&record.body, body) {
            Ok(same) => same,
            Err(e) => {
                warn!(
                    command_id = record.id,
                    command_name = %record.name,
                    error = %format!("{e:#}"),
                    "dedup comparison failed, treating as distinct"
                );
                false
            }
        }
    })
}
