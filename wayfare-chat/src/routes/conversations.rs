use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use wayfare_shared::errors::{AppError, AppResult, ErrorCode};
use wayfare_shared::types::api::ApiResponse;
use wayfare_shared::types::auth::AuthUser;

use crate::models::Message;
use crate::services::conversation_service::{self, ConversationSummary};
use crate::services::seen_service;
use crate::AppState;

// --- Request DTOs ---

#[derive(Debug, Deserialize)]
pub struct MarkSeenRequest {
    pub message_ids: Option<Vec<i64>>,
}

// --- Response DTOs ---

#[derive(Debug, Serialize)]
pub struct SeenUpdateResponse {
    pub partner_id: Uuid,
    pub updated: usize,
}

// --- Handlers ---

/// GET /conversations - list the viewer's conversation partners with unread badges
pub async fn list_conversations(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<Vec<ConversationSummary>>>> {
    let summaries = conversation_service::list_conversations(
        state.messages.as_ref(),
        state.users.as_ref(),
        &state.presence,
        auth_user.id,
    )
    .await?;

    Ok(Json(ApiResponse::ok(summaries)))
}

/// GET /conversations/:partner_id/messages - full thread, marks returned inbound messages seen
pub async fn list_thread(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(partner_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Vec<Message>>>> {
    let thread = seen_service::open_thread(state.messages.as_ref(), auth_user.id, partner_id)?;
    Ok(Json(ApiResponse::ok(thread)))
}

/// POST /conversations/:partner_id/seen - mark inbound messages of the thread seen
///
/// With a `message_ids` body only those messages are marked; without a body
/// the whole thread is.
pub async fn mark_seen(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(partner_id): Path<Uuid>,
    body: Option<Json<MarkSeenRequest>>,
) -> AppResult<Json<ApiResponse<SeenUpdateResponse>>> {
    let store = state.messages.as_ref();
    let updated = match body.and_then(|Json(req)| req.message_ids) {
        Some(ids) => seen_service::mark_messages_seen(store, auth_user.id, partner_id, &ids)?,
        None => seen_service::mark_thread_seen(store, auth_user.id, partner_id)?,
    };
    Ok(Json(ApiResponse::ok(SeenUpdateResponse { partner_id, updated })))
}

/// POST /conversations/:partner_id/toggle-seen - flip seen state of every inbound message
pub async fn toggle_seen(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(partner_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<SeenUpdateResponse>>> {
    if !state.config.seen_toggle_enabled && !auth_user.is_staff() {
        return Err(AppError::new(ErrorCode::Forbidden, "seen toggling is disabled"));
    }

    let updated = seen_service::toggle_thread_seen(state.messages.as_ref(), auth_user.id, partner_id)?;
    Ok(Json(ApiResponse::ok(SeenUpdateResponse { partner_id, updated })))
}
