//! Service error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use depot_metadata::{ErrorKind, MetadataError};
use depot_storage::StorageError;
use serde::Serialize;

/// Error body returned by the HTTP surface.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// Error returned by manager operations.
///
/// `NotFound` and `Conflict` pass through from the metadata repository
/// unchanged; everything else is wrapped with the operation that failed.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{context}: {message}")]
    Internal { context: String, message: String },
}

impl ServiceError {
    /// Wrap an opaque failure with the operation it happened in.
    pub fn internal(context: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Internal {
            context: context.into(),
            message: err.to_string(),
        }
    }

    /// Map a metadata error, keeping `NotFound`/`Conflict` and tagging the rest with `context`.
    pub fn from_metadata(context: &str, err: MetadataError) -> Self {
        match err {
            MetadataError::NotFound(what) => Self::NotFound(what),
            MetadataError::Conflict(what) => Self::Conflict(what),
            other => {
                tracing::error!(context = context, error = %other, "Metadata operation failed");
                Self::internal(context, other)
            }
        }
    }

    /// Map a blob store error. The store has no not-found notion, so every failure is internal.
    pub fn from_storage(context: &str, err: StorageError) -> Self {
        tracing::error!(context = context, error = %err, "Blob store operation failed");
        Self::internal(context, err)
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<MetadataError> for ServiceError {
    fn from(err: MetadataError) -> Self {
        Self::from_metadata("metadata", err)
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Internal details stay in the logs.
        let message = match &self {
            Self::Internal { context, .. } => format!("internal error during {context}"),
            other => other.to_string(),
        };
        let body = ErrorResponse {
            code: self.code().to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for manager operations.
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
