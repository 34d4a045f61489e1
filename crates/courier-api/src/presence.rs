use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::warn;

use courier_types::api::{LivenessRequest, OfflineRequest};
use courier_types::models::{Presence, User};

use crate::error::ApiError;
use crate::state::AppState;

/// updateLiveness: a liveness heartbeat. Resets the inactivity window and
/// flips the user online. Fire-and-forget from the client's point of view —
/// an unknown user is logged, not surfaced.
pub async fn update_liveness(
    State(state): State<AppState>,
    Json(req): Json<LivenessRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let id = req.user_id.to_string();
    let known = tokio::task::spawn_blocking(move || db.touch_liveness(&id)).await??;
    if !known {
        warn!("Liveness for unknown user {}", req.user_id);
    }
    Ok(Json(json!({ "ok": true })))
}

/// setOffline: the explicit logout / page-unload beacon. Best-effort and
/// idempotent — nothing depends on it firing, the sweep is authoritative.
pub async fn set_offline(
    State(state): State<AppState>,
    Json(req): Json<OfflineRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let id = req.user_id.to_string();
    let known = tokio::task::spawn_blocking(move || db.set_offline(&id)).await??;
    if !known {
        warn!("Offline beacon for unknown user {}", req.user_id);
    }
    Ok(Json(json!({ "ok": true })))
}

/// A user reads as online only while the inactivity window is open. A stale
/// 'online' row reports offline even before the sweep persists the
/// transition, so staleness is visible to the very next query.
pub fn effective_presence(user: &User, window_secs: u64, now: DateTime<Utc>) -> Presence {
    match user.status {
        Presence::Offline => Presence::Offline,
        Presence::Online => {
            if now.signed_duration_since(user.last_seen) >= Duration::seconds(window_secs as i64) {
                Presence::Offline
            } else {
                Presence::Online
            }
        }
    }
}
