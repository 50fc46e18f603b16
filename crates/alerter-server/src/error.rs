//! Error types for the alerter server.
//!
//! [`StoreError`] and [`PublishError`] are the failure modes of the two
//! external collaborators (backing store and alert channel). [`ApiError`]
//! maps failures onto HTTP responses.

use alerter_core::CoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Errors from the backing store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached or refused the request; safe to retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A SQLite operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A record body could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored record does not have the expected shape.
    #[error("corrupt record {key}: {reason}")]
    CorruptRecord { key: String, reason: String },
}

impl StoreError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Database(err) => match err {
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
                sqlx::Error::Database(db) => {
                    // SQLITE_BUSY / SQLITE_LOCKED
                    matches!(db.code().as_deref(), Some("5") | Some("6"))
                }
                _ => false,
            },
            StoreError::Serialization(_) | StoreError::CorruptRecord { .. } => false,
        }
    }
}

/// Errors from the event channel.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The channel has been shut down.
    #[error("channel closed")]
    Closed,

    /// The transport refused the message; safe to retry.
    #[error("publish unavailable: {0}")]
    Unavailable(String),

    #[error("event serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while simulating hazards.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors returned by HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request body is not a valid route or query.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// The backing store failed after retries.
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError::MalformedInput(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::MalformedInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
