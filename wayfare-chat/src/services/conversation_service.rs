use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use wayfare_shared::errors::AppResult;

use crate::directory::UserDirectory;
use crate::presence::PresenceTracker;
use crate::store::MessageStore;

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ConversationSummary {
    #[serde(rename = "id")]
    pub partner_id: Uuid,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub is_online: bool,
    pub unread_count: i64,
    pub last_message: String,
    pub last_message_id: i64,
    #[serde(rename = "timestamp")]
    pub last_message_at: DateTime<Utc>,
}

/// One summary per conversation partner of `viewer_id`, newest activity first.
///
/// Unread counts are computed from the live rows on every call. Partners the
/// user directory no longer knows (deleted accounts) are left out.
pub async fn list_conversations(
    store: &dyn MessageStore,
    users: &dyn UserDirectory,
    presence: &PresenceTracker,
    viewer_id: Uuid,
) -> AppResult<Vec<ConversationSummary>> {
    let partner_ids = store.partner_ids(viewer_id)?;
    if partner_ids.is_empty() {
        return Ok(vec![]);
    }

    let profiles = users.profiles(&partner_ids).await?;
    let known: Vec<Uuid> = partner_ids
        .into_iter()
        .filter(|id| profiles.contains_key(id))
        .collect();

    let unread = store.unread_counts(viewer_id)?;
    let online = presence.online_map(&known, Utc::now()).await?;

    let mut summaries = Vec::with_capacity(known.len());
    for partner_id in known {
        // Every message with this partner may have been deleted since the partner scan.
        let Some(last) = store.last_message_between(viewer_id, partner_id)? else {
            continue;
        };
        let profile = &profiles[&partner_id];

        summaries.push(ConversationSummary {
            partner_id,
            name: profile.display_name.clone(),
            avatar: profile.avatar_url.clone(),
            is_online: online.get(&partner_id).copied().unwrap_or(false),
            unread_count: unread.get(&partner_id).copied().unwrap_or(0),
            last_message: last.content,
            last_message_id: last.id,
            last_message_at: last.created_at,
        });
    }

    summaries.sort_by(|a, b| {
        b.last_message_at
            .cmp(&a.last_message_at)
            .then(b.last_message_id.cmp(&a.last_message_id))
    });

    Ok(summaries)
}

/// Total unread messages for `viewer_id` across all partners.
pub fn total_unread(store: &dyn MessageStore, viewer_id: Uuid) -> AppResult<i64> {
    Ok(store.unread_counts(viewer_id)?.values().sum())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Duration;

    use crate::directory::{MemoryUserDirectory, UserProfile};
    use crate::models::NewMessage;
    use crate::presence::MemoryPresenceStore;
    use crate::services::{message_service, seen_service};
    use crate::store::MemoryMessageStore;

    struct Fixture {
        store: MemoryMessageStore,
        users: MemoryUserDirectory,
        presence: PresenceTracker,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: MemoryMessageStore::new(),
                users: MemoryUserDirectory::new(),
                presence: PresenceTracker::new(
                    Arc::new(MemoryPresenceStore::new()),
                    Duration::seconds(15),
                    Duration::seconds(5),
                ),
            }
        }

        fn user(&self, name: &str) -> Uuid {
            let id = Uuid::new_v4();
            self.users.insert(UserProfile {
                id,
                display_name: Some(name.to_string()),
                avatar_url: Some(format!("https://cdn.example/{name}.png")),
            });
            id
        }

        async fn list(&self, viewer: Uuid) -> Vec<ConversationSummary> {
            list_conversations(&self.store, &self.users, &self.presence, viewer)
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn unread_counts_only_the_viewers_inbound() {
        let f = Fixture::new();
        let (a, b) = (f.user("a"), f.user("b"));
        message_service::send(&f.store, &f.users, a, b, "hi").await.unwrap();

        let a_view = f.list(a).await;
        assert_eq!(a_view.len(), 1);
        assert_eq!(a_view[0].partner_id, b);
        assert_eq!(a_view[0].unread_count, 0);

        let b_view = f.list(b).await;
        assert_eq!(b_view[0].partner_id, a);
        assert_eq!(b_view[0].unread_count, 1);
        assert_eq!(b_view[0].last_message, "hi");
        assert_eq!(b_view[0].name.as_deref(), Some("a"));

        seen_service::open_thread(&f.store, b, a).unwrap();
        assert_eq!(f.list(b).await[0].unread_count, 0);
        assert_eq!(total_unread(&f.store, b).unwrap(), 0);
    }

    #[tokio::test]
    async fn unread_count_tracks_live_rows() {
        let f = Fixture::new();
        let (viewer, partner) = (f.user("v"), f.user("p"));
        for text in ["1", "2", "3"] {
            message_service::send(&f.store, &f.users, partner, viewer, text).await.unwrap();
        }
        assert_eq!(f.list(viewer).await[0].unread_count, 3);

        let newest = f.store.last_message_between(viewer, partner).unwrap().unwrap();
        message_service::delete(&f.store, newest.id, partner).unwrap();
        let summary = &f.list(viewer).await[0];
        assert_eq!(summary.unread_count, 2);
        assert_eq!(summary.last_message, "2");

        seen_service::toggle_thread_seen(&f.store, viewer, partner).unwrap();
        assert_eq!(f.list(viewer).await[0].unread_count, 0);
        seen_service::toggle_thread_seen(&f.store, viewer, partner).unwrap();
        assert_eq!(f.list(viewer).await[0].unread_count, 2);
    }

    #[tokio::test]
    async fn partners_are_unique_and_ordered_by_recency() {
        let f = Fixture::new();
        let (me, old, recent) = (f.user("me"), f.user("old"), f.user("recent"));

        f.store.insert(NewMessage::new(me, old, "first")).unwrap();
        f.store.insert(NewMessage::new(old, me, "reply")).unwrap();
        f.store.insert(NewMessage::new(recent, me, "newest")).unwrap();

        let view = f.list(me).await;
        let order: Vec<Uuid> = view.iter().map(|s| s.partner_id).collect();
        assert_eq!(order, vec![recent, old]);
        assert_eq!(view[1].last_message, "reply");
        assert_eq!(total_unread(&f.store, me).unwrap(), 2);
    }

    #[tokio::test]
    async fn deleted_accounts_are_filtered_out() {
        let f = Fixture::new();
        let (me, gone) = (f.user("me"), f.user("gone"));
        message_service::send(&f.store, &f.users, gone, me, "bye").await.unwrap();
        f.users.remove(gone);

        assert!(f.list(me).await.is_empty());
    }

    #[tokio::test]
    async fn presence_is_attached() {
        let f = Fixture::new();
        let (me, friend) = (f.user("me"), f.user("friend"));
        message_service::send(&f.store, &f.users, friend, me, "yo").await.unwrap();

        assert!(!f.list(me).await[0].is_online);
        f.presence.touch(friend).await.unwrap();
        assert!(f.list(me).await[0].is_online);
    }

    #[test]
    fn summary_serializes_with_public_field_names() {
        let summary = ConversationSummary {
            partner_id: Uuid::nil(),
            name: Some("Ana".into()),
            avatar: None,
            is_online: true,
            unread_count: 2,
            last_message: "hi".into(),
            last_message_id: 7,
            last_message_at: Utc::now(),
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["id"], Uuid::nil().to_string());
        assert_eq!(json["unread_count"], 2);
        assert!(json.get("timestamp").is_some());
        assert!(json.get("partner_id").is_none());
    }
}
