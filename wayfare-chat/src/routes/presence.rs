use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use wayfare_shared::errors::AppResult;
use wayfare_shared::types::api::ApiResponse;
use wayfare_shared::types::auth::AuthUser;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct PresenceResponse {
    pub user_id: Uuid,
    pub is_online: bool,
}

/// POST /presence/heartbeat - explicit keep-alive for idle clients
pub async fn heartbeat(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<PresenceResponse>>> {
    // The activity layer has usually recorded this request already; the
    // tracker debounces the second write.
    state.presence.touch(auth_user.id).await?;

    Ok(Json(ApiResponse::ok(PresenceResponse {
        user_id: auth_user.id,
        is_online: true,
    })))
}

/// GET /presence/:user_id - online flag derived from last activity
pub async fn get_presence(
    _auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<PresenceResponse>>> {
    let is_online = state.presence.is_online(user_id).await?;
    Ok(Json(ApiResponse::ok(PresenceResponse { user_id, is_online })))
}
