//! Error type shared by the store, service and executor.
//!
//! Handlers keep using `anyhow` internally; their error chain is flattened
//! into the record's `exception` text and never crosses this boundary as a
//! typed error.

use thiserror::Error;

use crate::record::{CommandId, CommandStatus};

/// Errors surfaced by the command queue.
#[derive(Error, Debug)]
pub enum CommandError {
    /// The submitted payload was null or did not match the command's shape.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No registered command type matches the logical name.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// No record exists with this id.
    #[error("command {0} not found")]
    RecordNotFound(CommandId),

    /// A record was claimed but nothing is registered to execute it.
    #[error("no handler registered for command {name}")]
    NoHandler { name: String },

    /// A handler already exists for this command type.
    #[error("handler already registered for command {name}")]
    HandlerAlreadyRegistered { name: &'static str },

    /// Another catalog entry already normalizes to the same logical name.
    #[error("another command already uses the name {name}")]
    DuplicateCommandName { name: &'static str },

    /// The requested status change is not allowed from the record's current status.
    #[error("command {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: CommandId,
        from: CommandStatus,
        to: CommandStatus,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl CommandError {
    /// Whether the caller supplied bad input (as opposed to a server-side fault).
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            CommandError::InvalidArgument(_) | CommandError::UnknownCommand(_)
        )
    }

    /// Whether the error means the addressed thing does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CommandError::RecordNotFound(_) | CommandError::UnknownCommand(_)
        )
    }
}

pub type Result<T, E = CommandError> = std::result::Result<T, E>;
