//! Progress broadcast from log events.
//!
//! Handlers report progress by logging with a `progress` field:
//!
//! ```ignore
//! tracing::info!(progress = true, "Scanning {} files", files.len());
//! ```
//!
//! `progress = false` opts an event out; any other value counts as marked.
//!
//! While a handler runs, the executor wraps it in a task-local
//! [`CommandScope`]. [`ProgressLayer`] sees every event, and when the
//! current task carries a scope whose record streams updates and the event
//! carries the marker field, it forwards the formatted message over an
//! unbounded channel. [`ProgressBroadcast`] drains that channel into the
//! service's message cache, which emits `Updated`.
//!
//! The scope is task-local: work a handler moves onto `tokio::spawn` loses
//! it unless the spawned future is wrapped with [`scope`] again.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

use crate::record::CommandId;
use crate::service::CommandService;

/// Field that marks a log event as client-visible progress.
pub const PROGRESS_FIELD: &str = "progress";

tokio::task_local! {
    static CURRENT_COMMAND: CommandScope;
}

/// Identity of the command the current task is executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandScope {
    pub id: CommandId,
    pub send_updates_to_client: bool,
}

/// Run `future` with `command` as the current command scope.
pub async fn scope<F: Future>(command: CommandScope, future: F) -> F::Output {
    CURRENT_COMMAND.scope(command, future).await
}

/// The command scope of the current task, if any.
pub fn current() -> Option<CommandScope> {
    CURRENT_COMMAND.try_with(|scope| *scope).ok()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSignal {
    pub command_id: CommandId,
    pub message: String,
}

/// `tracing` layer that turns marked log events into [`ProgressSignal`]s.
pub struct ProgressLayer {
    sender: mpsc::UnboundedSender<ProgressSignal>,
}

impl ProgressLayer {
    /// Create the layer and the broadcast that consumes its signals.
    pub fn new() -> (Self, ProgressBroadcast) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, ProgressBroadcast { receiver })
    }
}

impl<S: Subscriber> Layer<S> for ProgressLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if event.metadata().fields().field(PROGRESS_FIELD).is_none() {
            return;
        }
        let Some(command) = current() else {
            return;
        };
        if !command.send_updates_to_client {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        if visitor.progress == Some(false) {
            return;
        }

        if let Some(message) = visitor.message {
            // The receiver only goes away at shutdown; dropping the signal is fine.
            let _ = self.sender.send(ProgressSignal {
                command_id: command.id,
                message,
            });
        }
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: Option<String>,
    progress: Option<bool>,
}

impl Visit for MessageVisitor {
    fn record_bool(&mut self, field: &Field, value: bool) {
        if field.name() == PROGRESS_FIELD {
            self.progress = Some(value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}"));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        }
    }
}

/// Receiving end of [`ProgressLayer`].
pub struct ProgressBroadcast {
    receiver: mpsc::UnboundedReceiver<ProgressSignal>,
}

impl ProgressBroadcast {
    /// Forward signals to `service` until every layer is dropped.
    pub async fn run(mut self, service: Arc<CommandService>) {
        while let Some(signal) = self.receiver.recv().await {
            service.report_progress(signal.command_id, signal.message);
        }
    }

    pub fn spawn(self, service: Arc<CommandService>) -> JoinHandle<()> {
        tokio::spawn(self.run(service))
    }

    /// Take the next pending signal without waiting.
    pub fn try_next(&mut self) -> Option<ProgressSignal> {
        self.receiver.try_recv().ok()
    }
}
