//! Mapping of queue errors onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use command_queue::CommandError;
use serde::Serialize;
use thiserror::Error;

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for client-side handling
    pub code: &'static str,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Request body is not a command object
    #[error("invalid request body: {0}")]
    InvalidBody(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            ApiError::Command(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            ApiError::Command(e) if e.is_validation() => StatusCode::BAD_REQUEST,
            ApiError::Command(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidBody(_) => "INVALID_BODY",
            ApiError::Command(CommandError::InvalidArgument(_)) => "INVALID_ARGUMENT",
            ApiError::Command(CommandError::UnknownCommand(_)) => "UNKNOWN_COMMAND",
            ApiError::Command(CommandError::RecordNotFound(_)) => "NOT_FOUND",
            ApiError::Command(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internals stay in the log
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            code: self.code(),
            message,
        };
        (status, Json(body)).into_response()
    }
}
