use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use courier_db::StoreError;
use courier_gateway::delivery::SendError;

/// Pull-surface error taxonomy.
///
/// `Validation` rejects with no state change and no point retrying;
/// `NotFound` names a missing entity; storage faults surface as 500 and the
/// caller retries on its own schedule. (The push path never sees this type —
/// its handlers log and drop at the handler boundary.)
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("internal task failure")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl From<SendError> for ApiError {
    fn from(e: SendError) -> Self {
        match e {
            SendError::Validation(msg) => ApiError::Validation(msg),
            SendError::Store(e) => ApiError::Store(e),
            SendError::TaskJoin(e) => ApiError::TaskJoin(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            // unknown sender/recipient or duplicate username: bad input,
            // not a storage fault
            ApiError::Store(StoreError::Constraint(_)) => StatusCode::BAD_REQUEST,
            ApiError::Store(_) | ApiError::TaskJoin(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", self);
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
