use crate::models::{ErrorKind, TransferError};
use crate::services::receiver::UploadError;
use crate::services::registry::RegistryError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),

    #[error("Transfer {id} failed: {error}")]
    Transfer { id: String, error: TransferError },
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::Rejected(RegistryError::Duplicate(id)) => {
                AppError::Conflict(format!("Transfer {} already exists", id))
            }
            UploadError::Rejected(other) => AppError::Internal(other.to_string()),
            UploadError::Failed { id, error } => AppError::Transfer { id, error },
        }
    }
}

/// HTTP status reported for a transfer that ended in `failed`.
pub fn transfer_status(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::TransportFailure | ErrorKind::CompressionFailure => StatusCode::BAD_REQUEST,
        ErrorKind::UnsupportedFormat => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        ErrorKind::DecompressionFailure => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::StorageFailure => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, json!({ "error": msg })),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal Server Error" }),
                )
            }
            AppError::Transfer { id, error } => {
                let status = transfer_status(error.kind());
                if status.is_server_error() {
                    tracing::error!("Transfer {} failed: {}", id, error);
                }
                (
                    status,
                    json!({
                        "error": error.detail(),
                        "kind": error.kind(),
                        "id": id,
                    }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
