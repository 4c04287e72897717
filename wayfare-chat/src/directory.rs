//! Read-only view of user profiles, owned by the user service.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use wayfare_shared::errors::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub id: Uuid,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Profiles for the given ids. Unknown or deleted users are simply absent.
    async fn profiles(&self, ids: &[Uuid]) -> AppResult<HashMap<Uuid, UserProfile>>;

    async fn exists(&self, id: Uuid) -> AppResult<bool> {
        Ok(self.profiles(&[id]).await?.contains_key(&id))
    }
}

// --- HTTP ---

#[derive(Debug, Deserialize)]
struct BatchProfileEntry {
    credential_id: Uuid,
    display_name: Option<String>,
    profile_photo: Option<String>,
}

pub struct HttpUserDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpUserDirectory {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn profiles(&self, ids: &[Uuid]) -> AppResult<HashMap<Uuid, UserProfile>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let url = format!("{}/internal/profiles/batch", self.base_url);
        let entries = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "credential_ids": ids }))
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| {
                tracing::error!(error = %e, url = %url, "user service request failed");
                AppError::Internal(e.into())
            })?
            .json::<Vec<BatchProfileEntry>>()
            .await
            .map_err(|e| AppError::Internal(e.into()))?;

        Ok(entries
            .into_iter()
            .map(|p| {
                (
                    p.credential_id,
                    UserProfile {
                        id: p.credential_id,
                        display_name: p.display_name,
                        avatar_url: p.profile_photo,
                    },
                )
            })
            .collect())
    }
}

// --- In-memory ---

#[derive(Default)]
pub struct MemoryUserDirectory {
    users: DashMap<Uuid, UserProfile>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, profile: UserProfile) {
        self.users.insert(profile.id, profile);
    }

    pub fn remove(&self, id: Uuid) {
        self.users.remove(&id);
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn profiles(&self, ids: &[Uuid]) -> AppResult<HashMap<Uuid, UserProfile>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.users.get(id).map(|p| (*id, p.value().clone())))
            .collect())
    }
}
