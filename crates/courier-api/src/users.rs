use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::Utc;
use uuid::Uuid;

use courier_types::api::{SearchQuery, UserStatusResponse, UserSummary};

use crate::error::ApiError;
use crate::presence::effective_presence;
use crate::state::AppState;

/// Current presence of a single user, as peers should see it.
pub async fn user_status(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserStatusResponse>, ApiError> {
    let db = state.db.clone();
    let id = user_id.to_string();
    let row = tokio::task::spawn_blocking(move || db.get_user(&id))
        .await??
        .ok_or(ApiError::NotFound("user"))?;

    let user = row.into_user();
    let status = effective_presence(&user, state.presence_window_secs, Utc::now());

    Ok(Json(UserStatusResponse {
        user_id: user.id,
        username: user.username,
        status,
        last_seen: user.last_seen,
    }))
}

/// Username substring search, for starting a new conversation.
pub async fn search_users(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    let db = state.db.clone();
    let q = query.q;
    let rows = tokio::task::spawn_blocking(move || db.search_users(&q, 20)).await??;

    let now = Utc::now();
    let users = rows
        .into_iter()
        .map(|row| {
            let user = row.into_user();
            let status = effective_presence(&user, state.presence_window_secs, now);
            UserSummary {
                user_id: user.id,
                username: user.username,
                status,
                last_seen: user.last_seen,
            }
        })
        .collect();

    Ok(Json(users))
}
