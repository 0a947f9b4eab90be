//! Command submission and observation.
//!
//! POST /api/commands        submit `{"name": "...", ...payload fields}`
//! GET  /api/commands        commands running right now
//! GET  /api/commands/:id    one command
//! DELETE /api/commands/:id  cancel a command that has not started

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use command_queue::{CommandId, CommandResource, CommandTrigger};
use serde_json::Value;

use crate::server::app::AppState;
use crate::server::error::ApiError;

/// Submit a command. The body is the command itself: its `name` plus the
/// payload's fields.
///
/// Resubmitting work that is already queued or running returns the existing
/// command with 200 rather than queueing a new one with 201.
pub async fn submit_command_handler(
    Extension(state): Extension<AppState>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<CommandResource>), ApiError> {
    let (name, payload) = split_command(body)?;

    let submission = state
        .service
        .submit(&name, payload, CommandTrigger::Manual)
        .await?;

    let status = if submission.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(CommandResource::from(submission.record))))
}

pub async fn get_command_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<CommandId>,
) -> Result<Json<CommandResource>, ApiError> {
    let record = state.service.get(id).await?;
    Ok(Json(record.into()))
}

pub async fn list_running_handler(
    Extension(state): Extension<AppState>,
) -> Result<Json<Vec<CommandResource>>, ApiError> {
    let running = state.service.get_running().await?;
    Ok(Json(running.into_iter().map(CommandResource::from).collect()))
}

/// Cancel a queued command. 409 if it already started or ended.
pub async fn cancel_command_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<CommandId>,
) -> Result<StatusCode, ApiError> {
    if state.service.cancel(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Ok(StatusCode::CONFLICT)
    }
}

/// Split a submitted command object into its name and payload.
fn split_command(body: Value) -> Result<(String, Value), ApiError> {
    let Value::Object(mut fields) = body else {
        return Err(ApiError::InvalidBody("expected a JSON object".to_string()));
    };

    let name = match fields.remove("name") {
        Some(Value::String(name)) if !name.trim().is_empty() => name,
        Some(_) => return Err(ApiError::InvalidBody("name must be a non-empty string".to_string())),
        None => return Err(ApiError::InvalidBody("missing required field: name".to_string())),
    };

    Ok((name, Value::Object(fields)))
}
