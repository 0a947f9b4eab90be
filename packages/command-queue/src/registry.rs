//! Handler registry for dispatching claimed records.
//!
//! The registry maps a command's `NAME` to a closure that deserializes the
//! stored body back into the exact payload type and runs its handler. Each
//! payload type gets exactly one handler.

use std::any::TypeId;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::{Context, Result as AnyResult};
use async_trait::async_trait;
use serde_json::Value;

use crate::command::Command;
use crate::context::CommandContext;
use crate::error::{CommandError, Result};
use crate::record::CommandRecord;

/// Future returned by a dispatched handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = AnyResult<()>> + Send>>;

type BoxedHandler = Box<dyn Fn(Value, CommandContext) -> HandlerFuture + Send + Sync>;

/// Executes one payload type.
#[async_trait]
pub trait CommandHandler<C: Command>: Send + Sync + 'static {
    async fn execute(&self, command: C, ctx: CommandContext) -> AnyResult<()>;
}

struct Registration {
    type_id: TypeId,
    handler: BoxedHandler,
}

/// Registry that maps command names to handlers.
///
/// # Example
///
/// ```ignore
/// let mut registry = HandlerRegistry::new();
///
/// registry.register::<RefreshSeries, _, _>(|cmd, ctx| async move {
///     ctx.report_progress(format!("Refreshing {:?}", cmd.series_id));
///     Ok(())
/// })?;
///
/// // Or with a handler struct
/// registry.register_handler::<Backup, _>(BackupHandler::new(paths))?;
/// ```
#[derive(Default)]
pub struct HandlerRegistry {
    registrations: HashMap<&'static str, Registration>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an async closure as the handler for `C`.
    pub fn register<C, F, Fut>(&mut self, handler: F) -> Result<()>
    where
        C: Command,
        F: Fn(C, CommandContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AnyResult<()>> + Send + 'static,
    {
        if self.registrations.contains_key(C::NAME) {
            return Err(CommandError::HandlerAlreadyRegistered { name: C::NAME });
        }

        let handler = Arc::new(handler);
        let boxed: BoxedHandler = Box::new(move |body, ctx| {
            let handler = handler.clone();
            Box::pin(async move {
                let command: C = serde_json::from_value(body)
                    .with_context(|| format!("failed to deserialize {}", C::NAME))?;
                (*handler)(command, ctx).await
            })
        });

        self.registrations.insert(
            C::NAME,
            Registration {
                type_id: TypeId::of::<C>(),
                handler: boxed,
            },
        );
        Ok(())
    }

    /// Register a [`CommandHandler`] implementation for `C`.
    pub fn register_handler<C, H>(&mut self, handler: H) -> Result<()>
    where
        C: Command,
        H: CommandHandler<C>,
    {
        let handler = Arc::new(handler);
        self.register::<C, _, _>(move |command, ctx| {
            let handler = handler.clone();
            async move { handler.execute(command, ctx).await }
        })
    }

    /// Whether `C` itself (not just a type sharing its name) has a handler.
    pub fn handles<C: Command>(&self) -> bool {
        self.registrations
            .get(C::NAME)
            .is_some_and(|r| r.type_id == TypeId::of::<C>())
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.registrations.contains_key(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.registrations.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Build the handler future for a claimed record.
    pub fn dispatch(&self, record: &CommandRecord, ctx: CommandContext) -> Result<HandlerFuture> {
        let registration = self
            .registrations
            .get(record.name.as_str())
            .ok_or_else(|| CommandError::NoHandler {
                name: record.name.clone(),
            })?;

        Ok((registration.handler)(record.body.clone(), ctx))
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("commands", &self.names())
            .finish()
    }
}
