//! Compile-time catalog of command types, resolvable by logical name.
//!
//! External callers (HTTP, cron schedules) only know a command by name.
//! The catalog maps a normalized form of that name to functions that build
//! a [`PreparedCommand`] for the concrete type.

use std::collections::HashMap;

use serde_json::Value;

use crate::command::Command;
use crate::dedup::{SameWorkFn, same_work};
use crate::error::{CommandError, Result};
use crate::record::CommandPriority;

/// A command payload erased to JSON, with everything the service needs to
/// dedup and persist it.
#[derive(Clone)]
pub struct PreparedCommand {
    pub name: &'static str,
    pub body: Value,
    pub priority: CommandPriority,
    pub send_updates_to_client: bool,
    pub same_work: SameWorkFn,
}

impl PreparedCommand {
    pub fn new<C: Command>(command: &C) -> Result<Self> {
        Ok(Self {
            name: C::NAME,
            body: serde_json::to_value(command)?,
            priority: command.priority(),
            send_updates_to_client: command.send_updates_to_client(),
            same_work: same_work::<C>,
        })
    }
}

impl std::fmt::Debug for PreparedCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedCommand")
            .field("name", &self.name)
            .field("body", &self.body)
            .field("priority", &self.priority)
            .field("send_updates_to_client", &self.send_updates_to_client)
            .finish_non_exhaustive()
    }
}

struct CatalogEntry {
    name: &'static str,
    empty: fn() -> Result<PreparedCommand>,
    from_json: fn(Value) -> Result<PreparedCommand>,
}

fn prepare_empty<C: Command + Default>() -> Result<PreparedCommand> {
    PreparedCommand::new(&C::default())
}

fn prepare_from_json<C: Command>(body: Value) -> Result<PreparedCommand> {
    let command: C = serde_json::from_value(body)
        .map_err(|e| CommandError::InvalidArgument(format!("invalid {} payload: {e}", C::NAME)))?;
    PreparedCommand::new(&command)
}

/// Name lookup for registered command types.
#[derive(Default)]
pub struct CommandCatalog {
    entries: HashMap<String, CatalogEntry>,
}

impl CommandCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `C` under its normalized name.
    ///
    /// Fails if another type already normalizes to the same name.
    pub fn register<C: Command + Default>(&mut self) -> Result<()> {
        let key = normalize_name(C::NAME);
        if self.entries.contains_key(&key) {
            return Err(CommandError::DuplicateCommandName { name: C::NAME });
        }
        self.entries.insert(
            key,
            CatalogEntry {
                name: C::NAME,
                empty: prepare_empty::<C>,
                from_json: prepare_from_json::<C>,
            },
        );
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<C: Command + Default>(mut self) -> Result<Self> {
        self.register::<C>()?;
        Ok(self)
    }

    /// Canonical `NAME` for a logical name, if registered.
    pub fn resolve(&self, logical_name: &str) -> Option<&'static str> {
        self.entries.get(&normalize_name(logical_name)).map(|e| e.name)
    }

    pub fn contains(&self, logical_name: &str) -> bool {
        self.resolve(logical_name).is_some()
    }

    /// Build the default payload of the named command.
    pub fn prepare_empty(&self, logical_name: &str) -> Result<PreparedCommand> {
        let entry = self.entry(logical_name)?;
        (entry.empty)()
    }

    /// Build the named command from a JSON payload.
    ///
    /// A null payload is rejected rather than treated as "empty".
    pub fn prepare_json(&self, logical_name: &str, body: Value) -> Result<PreparedCommand> {
        let entry = self.entry(logical_name)?;
        if body.is_null() {
            return Err(CommandError::InvalidArgument(format!(
                "payload for {} must not be null",
                entry.name
            )));
        }
        (entry.from_json)(body)
    }

    /// Registered canonical names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.entries.values().map(|e| e.name).collect();
        names.sort_unstable();
        names
    }

    fn entry(&self, logical_name: &str) -> Result<&CatalogEntry> {
        self.entries
            .get(&normalize_name(logical_name))
            .ok_or_else(|| CommandError::UnknownCommand(logical_name.to_string()))
    }
}

/// Lowercase, drop any namespace prefix and a trailing "Command".
///
/// `Tv.Commands.RefreshSeriesCommand`, `tv::RefreshSeries` and `refreshseries`
/// all normalize to `refreshseries`.
pub fn normalize_name(name: &str) -> String {
    let trimmed = name.trim();
    let last = trimmed
        .rsplit(['.', ':'])
        .next()
        .unwrap_or(trimmed)
        .to_lowercase();

    match last.strip_suffix("command") {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => last,
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    use super::*;

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct RefreshSeries {
        series_id: Option<i64>,
    }

    impl Command for RefreshSeries {
        const NAME: &'static str = "RefreshSeries";

        fn send_updates_to_client(&self) -> bool {
            true
        }
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct RefreshSeriesCommand;

    impl Command for RefreshSeriesCommand {
        const NAME: &'static str = "RefreshSeriesCommand";
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Backup {
        #[serde(default)]
        kind: String,
    }

    impl Command for Backup {
        const NAME: &'static str = "Backup";

        fn priority(&self) -> CommandPriority {
            CommandPriority::High
        }
    }

    #[test]
    fn normalize_strips_namespace_and_suffix() {
        assert_eq!(normalize_name("RefreshSeries"), "refreshseries");
        assert_eq!(normalize_name("refreshSeriesCommand"), "refreshseries");
        assert_eq!(normalize_name("Tv.Commands.RefreshSeriesCommand"), "refreshseries");
        assert_eq!(normalize_name("tv::RefreshSeries"), "refreshseries");
        assert_eq!(normalize_name("Command"), "command");
    }

    #[test]
    fn resolve_is_case_insensitive() {
        let catalog = CommandCatalog::new().with::<RefreshSeries>().unwrap();
        assert_eq!(catalog.resolve("REFRESHSERIES"), Some("RefreshSeries"));
        assert_eq!(catalog.resolve("refreshseriescommand"), Some("RefreshSeries"));
        assert_eq!(catalog.resolve("RescanFolder"), None);
    }

    #[test]
    fn colliding_names_are_rejected() {
        let mut catalog = CommandCatalog::new();
        catalog.register::<RefreshSeries>().unwrap();

        let err = catalog.register::<RefreshSeriesCommand>().unwrap_err();
        assert!(matches!(
            err,
            CommandError::DuplicateCommandName { name: "RefreshSeriesCommand" }
        ));
    }

    #[test]
    fn prepare_empty_uses_type_metadata() {
        let catalog = CommandCatalog::new().with::<Backup>().unwrap();
        let prepared = catalog.prepare_empty("backupcommand").unwrap();

        assert_eq!(prepared.name, "Backup");
        assert_eq!(prepared.priority, CommandPriority::High);
        assert_eq!(prepared.body, json!({ "kind": "" }));
    }

    #[test]
    fn prepare_json_rejects_null_and_malformed() {
        let catalog = CommandCatalog::new().with::<RefreshSeries>().unwrap();

        let null = catalog.prepare_json("RefreshSeries", Value::Null).unwrap_err();
        assert!(matches!(null, CommandError::InvalidArgument(_)));

        let malformed = catalog
            .prepare_json("RefreshSeries", json!({ "series_id": "four" }))
            .unwrap_err();
        assert!(matches!(malformed, CommandError::InvalidArgument(_)));
    }

    #[test]
    fn unknown_name_is_reported() {
        let catalog = CommandCatalog::new();
        let err = catalog.prepare_empty("Nope").unwrap_err();
        assert!(matches!(err, CommandError::UnknownCommand(name) if name == "Nope"));
    }

    #[test]
    fn names_are_sorted() {
        let catalog = CommandCatalog::new()
            .with::<RefreshSeries>()
            .unwrap()
            .with::<Backup>()
            .unwrap();
        assert_eq!(catalog.names(), vec!["Backup", "RefreshSeries"]);
    }
}
