//! SSE streaming endpoint.
//!
//! GET /api/commands/stream
//!
//! Forwards `queued`, `updated` and `executed` events for commands that ask
//! for client updates. Commands that don't stream never appear here.

use std::convert::Infallible;

use axum::{
    extract::Extension,
    response::sse::{Event, KeepAlive, Sse},
};
use command_queue::CommandEvent;
use futures::stream::{self, StreamExt};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use crate::server::app::AppState;

/// SSE stream handler.
pub async fn stream_handler(
    Extension(state): Extension<AppState>,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.service.events().subscribe();

    // Stream with connected event and lag handling
    let connected =
        stream::once(async { Ok::<_, Infallible>(Event::default().event("connected").data("ok")) });

    let events = BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(event) => to_sse(&event).map(Ok),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "SSE subscriber lagged, events dropped");
                Some(Ok(Event::default()
                    .event("lagged")
                    .data(format!("{{\"skipped\":{skipped}}}"))))
            }
        }
    });

    Sse::new(connected.chain(events)).keep_alive(KeepAlive::default())
}

/// Serialize one event, or `None` if the command does not stream updates.
fn to_sse(event: &CommandEvent) -> Option<Event> {
    let resource = event.resource();
    if !resource.send_updates_to_client {
        return None;
    }

    match serde_json::to_string(resource) {
        Ok(data) => Some(Event::default().event(event.kind()).data(data)),
        Err(e) => {
            tracing::error!(command_id = resource.id, error = %e, "failed to serialize command event");
            None
        }
    }
}
