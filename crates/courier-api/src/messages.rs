use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;

use courier_gateway::delivery;
use courier_types::api::{MessageQuery, MessageResponse, SendMessageRequest};

use crate::error::ApiError;
use crate::state::AppState;

/// createMessage: writes the message with status 'sent' and fans out to the
/// recipient's and sender's channels. Validation failures reject with no
/// state change.
pub async fn create_message(
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let content = B64
        .decode(&req.content)
        .map_err(|_| ApiError::Validation("content must be valid base64"))?;

    let message =
        delivery::send_message(&state.db, &state.dispatcher, req.from, req.to, content).await?;

    Ok((StatusCode::CREATED, Json(MessageResponse::from(&message))))
}

/// getMessages: the full conversation between two users, both directions,
/// ascending by creation time. Symmetric in `from`/`to` — this is the poll
/// the reconciler treats as authoritative.
pub async fn get_messages(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
) -> Result<Json<Vec<MessageResponse>>, ApiError> {
    // Run blocking DB work off the async runtime
    let db = state.db.clone();
    let (a, b) = (query.from.to_string(), query.to.to_string());
    let rows = tokio::task::spawn_blocking(move || db.conversation_messages(&a, &b)).await??;

    let messages = rows
        .into_iter()
        .map(|row| MessageResponse::from(&row.into_message()))
        .collect();

    Ok(Json(messages))
}
