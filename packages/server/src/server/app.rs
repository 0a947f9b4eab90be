//! Application setup and server configuration.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{header::CONTENT_TYPE, Method},
    routing::get,
    Router,
};
use command_queue::CommandService;
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::server::routes::{
    cancel_command_handler, get_command_handler, health_handler, list_running_handler,
    stream_handler, submit_command_handler,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CommandService>,
    /// Absent when the queue runs on the in-memory store.
    pub db_pool: Option<PgPool>,
}

impl AppState {
    pub fn new(service: Arc<CommandService>, db_pool: Option<PgPool>) -> Self {
        Self { service, db_pool }
    }
}

/// Build the Axum application router
pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route(
            "/api/commands",
            get(list_running_handler).post(submit_command_handler),
        )
        .route("/api/commands/stream", get(stream_handler))
        .route(
            "/api/commands/:id",
            get(get_command_handler).delete(cancel_command_handler),
        )
        .route("/health", get(health_handler))
        .layer(Extension(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
