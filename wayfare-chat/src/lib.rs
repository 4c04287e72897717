use axum::{middleware, routing::{get, post}, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod activity;
pub mod config;
pub mod directory;
pub mod models;
pub mod presence;
pub mod routes;
pub mod schema;
pub mod services;
pub mod store;

use config::AppConfig;
use directory::UserDirectory;
use presence::PresenceTracker;
use store::MessageStore;

pub struct AppState {
    pub config: AppConfig,
    pub messages: Arc<dyn MessageStore>,
    pub users: Arc<dyn UserDirectory>,
    pub presence: PresenceTracker,
    pub metrics_handle: Option<PrometheusHandle>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Conversations
        .route("/conversations", get(routes::conversations::list_conversations))
        .route("/conversations/:partner_id/messages", get(routes::conversations::list_thread))
        .route("/conversations/:partner_id/seen", post(routes::conversations::mark_seen))
        .route("/conversations/:partner_id/toggle-seen", post(routes::conversations::toggle_seen))
        // Messages
        .route("/messages", post(routes::messages::send_message))
        .route(
            "/messages/:id",
            get(routes::messages::get_message)
                .put(routes::messages::edit_message)
                .patch(routes::messages::edit_message)
                .delete(routes::messages::delete_message),
        )
        .route("/unread-count", get(routes::messages::get_unread_count))
        // Presence
        .route("/presence/heartbeat", post(routes::presence::heartbeat))
        .route("/presence/:user_id", get(routes::presence::get_presence))
        .layer(middleware::from_fn_with_state(state.clone(), activity::track_activity))
        // Health
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::health::metrics))
        .layer(middleware::from_fn(wayfare_shared::middleware::metrics_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
