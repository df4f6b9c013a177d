//! API error types and HTTP status mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::manager::ManagerError;
use crate::storage::StorageError;

/// API error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// API error type that can be converted to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Malformed or invalid request.
    BadRequest(String),
    /// Request conflicts with current state (duplicate id, active run).
    Conflict(String),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg)
            }
        };

        let body = ErrorResponse {
            error: message,
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<ManagerError> for ApiError {
    fn from(err: ManagerError) -> Self {
        match err {
            ManagerError::ScenarioNotFound(_) => ApiError::NotFound(err.to_string()),
            ManagerError::Storage(StorageError::NotFound(_)) => {
                ApiError::NotFound(err.to_string())
            }
            ManagerError::Storage(StorageError::DuplicateKey(_)) => {
                ApiError::Conflict(err.to_string())
            }
            ManagerError::CacheMiss(_)
            | ManagerError::StaleCache(_)
            | ManagerError::ProducedNode(_)
            | ManagerError::AlreadyRunning(_)
            | ManagerError::NotRunning(_) => ApiError::Conflict(err.to_string()),
            ManagerError::Graph(_) | ManagerError::Config(_) => {
                ApiError::BadRequest(err.to_string())
            }
            ManagerError::Storage(_) | ManagerError::Cache(_) | ManagerError::Execution(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}
