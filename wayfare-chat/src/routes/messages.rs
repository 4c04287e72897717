use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use wayfare_shared::errors::{AppError, AppResult, ErrorCode};
use wayfare_shared::types::api::ApiResponse;
use wayfare_shared::types::auth::AuthUser;

use crate::models::Message;
use crate::services::{conversation_service, message_service};
use crate::AppState;

// --- Request DTOs ---

#[derive(Debug, Deserialize, Validate)]
pub struct SendMessageRequest {
    pub receiver_id: Option<Uuid>,
    #[validate(length(max = 4000, message = "message content is too long"))]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct EditMessageRequest {
    #[validate(length(max = 4000, message = "message content is too long"))]
    pub content: Option<String>,
}

// --- Response DTOs ---

#[derive(Debug, Serialize)]
pub struct DeleteMessageResponse {
    pub id: i64,
    pub deleted: bool,
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub total_unread: i64,
}

fn validation_error(e: validator::ValidationErrors) -> AppError {
    let details = serde_json::to_value(&e).unwrap_or_default();
    AppError::with_details(ErrorCode::ValidationError, "invalid request body", details)
}

// --- Handlers ---

/// POST /messages - send a direct message
pub async fn send_message(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<SendMessageRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Message>>)> {
    req.validate().map_err(validation_error)?;

    let receiver_id = req
        .receiver_id
        .ok_or_else(|| AppError::new(ErrorCode::ValidationError, "receiver_id is required"))?;
    let content = req.content.unwrap_or_default();

    let message = message_service::send(
        state.messages.as_ref(),
        state.users.as_ref(),
        auth_user.id,
        receiver_id,
        &content,
    )
    .await?;

    tracing::info!(
        message_id = message.id,
        sender = %auth_user.id,
        receiver = %receiver_id,
        "message sent"
    );

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(message))))
}

/// GET /messages/:id - fetch one message (participants only)
pub async fn get_message(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(message_id): Path<i64>,
) -> AppResult<Json<ApiResponse<Message>>> {
    let message = message_service::get(state.messages.as_ref(), message_id, auth_user.id)?;
    Ok(Json(ApiResponse::ok(message)))
}

/// PUT|PATCH /messages/:id - edit a message (only the sender can edit)
pub async fn edit_message(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(message_id): Path<i64>,
    Json(req): Json<EditMessageRequest>,
) -> AppResult<Json<ApiResponse<Message>>> {
    req.validate().map_err(validation_error)?;
    let content = req.content.unwrap_or_default();

    let message = message_service::edit(state.messages.as_ref(), message_id, auth_user.id, &content)?;

    Ok(Json(ApiResponse::ok(message)))
}

/// DELETE /messages/:id - hard delete a message (only the sender can delete)
pub async fn delete_message(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(message_id): Path<i64>,
) -> AppResult<Json<ApiResponse<DeleteMessageResponse>>> {
    message_service::delete(state.messages.as_ref(), message_id, auth_user.id)?;

    tracing::info!(message_id = message_id, requester = %auth_user.id, "message deleted");

    Ok(Json(ApiResponse::ok(DeleteMessageResponse {
        id: message_id,
        deleted: true,
    })))
}

/// GET /unread-count - total unread messages across all conversations
pub async fn get_unread_count(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<UnreadCountResponse>>> {
    let total_unread = conversation_service::total_unread(state.messages.as_ref(), auth_user.id)?;
    Ok(Json(ApiResponse::ok(UnreadCountResponse { total_unread })))
}
