//! Heartbeat-based presence.
//!
//! There is no disconnect signal: a user stays online for up to the online
//! window after their last tracked request.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use wayfare_shared::clients::redis::RedisClient;
use wayfare_shared::errors::{AppError, AppResult};

const LAST_ACTIVITY_TTL_SECS: u64 = 24 * 60 * 60;

pub fn is_online(now: DateTime<Utc>, last_activity: Option<DateTime<Utc>>, window: Duration) -> bool {
    last_activity.is_some_and(|at| now - at <= window)
}

#[async_trait]
pub trait PresenceStore: Send + Sync {
    async fn record(&self, user_id: Uuid, at: DateTime<Utc>) -> AppResult<()>;

    async fn last_activity(&self, user_id: Uuid) -> AppResult<Option<DateTime<Utc>>>;

    async fn last_activity_many(&self, user_ids: &[Uuid]) -> AppResult<HashMap<Uuid, DateTime<Utc>>>;

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

pub struct PresenceTracker {
    store: Arc<dyn PresenceStore>,
    window: Duration,
    debounce: Duration,
    // Last timestamp this process wrote per user. Entries older than the
    // debounce can no longer suppress a write and are pruned.
    last_written: DashMap<Uuid, DateTime<Utc>>,
    last_pruned_ms: AtomicI64,
}

impl PresenceTracker {
    pub fn new(store: Arc<dyn PresenceStore>, window: Duration, debounce: Duration) -> Self {
        Self {
            store,
            window,
            debounce,
            last_written: DashMap::new(),
            last_pruned_ms: AtomicI64::new(0),
        }
    }

    pub async fn touch(&self, user_id: Uuid) -> AppResult<bool> {
        self.touch_at(user_id, Utc::now()).await
    }

    /// Record activity at `now`. Returns `false` when the write was skipped
    /// because a recent enough timestamp is already stored.
    pub async fn touch_at(&self, user_id: Uuid, now: DateTime<Utc>) -> AppResult<bool> {
        let previous = self.last_written.get(&user_id).map(|e| *e.value());
        if let Some(prev) = previous {
            if now >= prev && now - prev < self.debounce {
                return Ok(false);
            }
        }

        self.store.record(user_id, now).await?;
        self.last_written.insert(user_id, now);
        self.prune_stale(now);
        tracing::trace!(user_id = %user_id, "activity recorded");
        Ok(true)
    }

    /// Drop debounce entries that have expired, at most once per debounce period.
    fn prune_stale(&self, now: DateTime<Utc>) {
        let now_ms = now.timestamp_millis();
        let last = self.last_pruned_ms.load(Ordering::Relaxed);
        if now_ms - last < self.debounce.num_milliseconds() {
            return;
        }
        if self
            .last_pruned_ms
            .compare_exchange(last, now_ms, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            return;
        }

        let before = self.last_written.len();
        self.last_written.retain(|_, at| *at > now || now - *at < self.debounce);
        tracing::trace!(pruned = before.saturating_sub(self.last_written.len()), "debounce entries pruned");
    }

    pub async fn is_online(&self, user_id: Uuid) -> AppResult<bool> {
        self.is_online_at(user_id, Utc::now()).await
    }

    pub async fn is_online_at(&self, user_id: Uuid, now: DateTime<Utc>) -> AppResult<bool> {
        let last = self.store.last_activity(user_id).await?;
        Ok(is_online(now, last, self.window))
    }

    /// Online flags for a batch of users. Every requested id gets an entry.
    pub async fn online_map(&self, user_ids: &[Uuid], now: DateTime<Utc>) -> AppResult<HashMap<Uuid, bool>> {
        let last = self.store.last_activity_many(user_ids).await?;
        Ok(user_ids
            .iter()
            .map(|id| (*id, is_online(now, last.get(id).copied(), self.window)))
            .collect())
    }

    pub async fn ping(&self) -> AppResult<()> {
        self.store.ping().await
    }
}

// --- Redis ---

/// Stores epoch milliseconds under `presence:last_activity:{user_id}`.
pub struct RedisPresenceStore {
    redis: RedisClient,
}

impl RedisPresenceStore {
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }

    fn key(user_id: Uuid) -> String {
        format!("presence:last_activity:{user_id}")
    }

    fn parse(raw: &str) -> Option<DateTime<Utc>> {
        raw.parse::<i64>().ok().and_then(DateTime::from_timestamp_millis)
    }
}

fn redis_error(e: redis::RedisError) -> AppError {
    tracing::error!(error = %e, "presence store error");
    AppError::Internal(e.into())
}

#[async_trait]
impl PresenceStore for RedisPresenceStore {
    async fn record(&self, user_id: Uuid, at: DateTime<Utc>) -> AppResult<()> {
        self.redis
            .set(&Self::key(user_id), &at.timestamp_millis().to_string(), LAST_ACTIVITY_TTL_SECS)
            .await
            .map_err(redis_error)
    }

    async fn last_activity(&self, user_id: Uuid) -> AppResult<Option<DateTime<Utc>>> {
        let raw = self.redis.get(&Self::key(user_id)).await.map_err(redis_error)?;
        Ok(raw.as_deref().and_then(Self::parse))
    }

    async fn last_activity_many(&self, user_ids: &[Uuid]) -> AppResult<HashMap<Uuid, DateTime<Utc>>> {
        let keys: Vec<String> = user_ids.iter().map(|id| Self::key(*id)).collect();
        let values = self.redis.mget(&keys).await.map_err(redis_error)?;

        Ok(user_ids
            .iter()
            .zip(values)
            .filter_map(|(id, raw)| raw.as_deref().and_then(Self::parse).map(|at| (*id, at)))
            .collect())
    }

    async fn ping(&self) -> AppResult<()> {
        self.redis.ping().await.map_err(redis_error)
    }
}

// --- In-memory ---

#[derive(Default)]
pub struct MemoryPresenceStore {
    last_activity: DashMap<Uuid, DateTime<Utc>>,
}

impl MemoryPresenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PresenceStore for MemoryPresenceStore {
    async fn record(&self, user_id: Uuid, at: DateTime<Utc>) -> AppResult<()> {
        self.last_activity.insert(user_id, at);
        Ok(())
    }

    async fn last_activity(&self, user_id: Uuid) -> AppResult<Option<DateTime<Utc>>> {
        Ok(self.last_activity.get(&user_id).map(|e| *e.value()))
    }

    async fn last_activity_many(&self, user_ids: &[Uuid]) -> AppResult<HashMap<Uuid, DateTime<Utc>>> {
        Ok(user_ids
            .iter()
            .filter_map(|id| self.last_activity.get(id).map(|e| (*id, *e.value())))
            .collect())
    }
}
