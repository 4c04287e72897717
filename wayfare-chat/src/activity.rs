use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use wayfare_shared::middleware::OptionalAuthUser;

use crate::AppState;

/// Touch the caller's presence on every request that carries a valid token.
///
/// Presence failures are logged and never fail the request itself.
pub async fn track_activity(
    State(state): State<Arc<AppState>>,
    OptionalAuthUser(user): OptionalAuthUser,
    req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(user) = user {
        if let Err(e) = state.presence.touch(user.id).await {
            tracing::warn!(error = %e, user_id = %user.id, "failed to record activity");
        }
    }

    next.run(req).await
}
