use std::sync::Arc;

use wayfare_chat::config::{AppConfig, MessageBackend, PresenceBackend};
use wayfare_chat::directory::HttpUserDirectory;
use wayfare_chat::presence::{MemoryPresenceStore, PresenceStore, PresenceTracker, RedisPresenceStore};
use wayfare_chat::store::{MemoryMessageStore, MessageStore, PgMessageStore};
use wayfare_chat::AppState;
use wayfare_shared::clients::db::create_pool;
use wayfare_shared::clients::redis::RedisClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    wayfare_shared::middleware::init_tracing("wayfare-chat");

    let config = AppConfig::load()?;
    let port = config.port;
    let metrics_handle = wayfare_shared::middleware::init_metrics()?;

    let messages: Arc<dyn MessageStore> = match config.message_store {
        MessageBackend::Postgres => {
            let pool = create_pool(&config.database_url, config.database_pool_size)?;
            Arc::new(PgMessageStore::new(pool))
        }
        MessageBackend::Memory => {
            tracing::warn!("using in-memory message store, messages are lost on restart");
            Arc::new(MemoryMessageStore::new())
        }
    };

    let presence_store: Arc<dyn PresenceStore> = match config.presence_store {
        PresenceBackend::Redis => Arc::new(RedisPresenceStore::new(RedisClient::connect(&config.redis_url).await?)),
        PresenceBackend::Memory => Arc::new(MemoryPresenceStore::new()),
    };
    let presence = PresenceTracker::new(presence_store, config.online_window(), config.presence_debounce());

    let users = Arc::new(HttpUserDirectory::new(reqwest::Client::new(), config.user_service_url.clone()));

    let state = Arc::new(AppState {
        config,
        messages,
        users,
        presence,
        metrics_handle: Some(metrics_handle),
    });

    let app = wayfare_chat::router(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "wayfare-chat starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
