//! Durable record of direct messages.
//!
//! Every method is a single atomic operation against the backing store. Seen
//! transitions are predicate-based bulk updates, never fetch-then-update, so a
//! message inserted concurrently is either covered by the predicate or left
//! for the next call.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use wayfare_shared::errors::AppResult;

use crate::models::{Message, NewMessage};

mod memory;
mod postgres;

pub use memory::MemoryMessageStore;
pub use postgres::PgMessageStore;

pub trait MessageStore: Send + Sync {
    fn insert(&self, new_message: NewMessage) -> AppResult<Message>;

    fn find(&self, id: i64) -> AppResult<Option<Message>>;

    /// All messages exchanged by `a` and `b`, ascending by `(created_at, id)`.
    fn list_between(&self, a: Uuid, b: Uuid) -> AppResult<Vec<Message>>;

    /// Replace the content of a message owned by `sender_id`.
    /// `None` when no such row exists (any more).
    fn update_content(
        &self,
        id: i64,
        sender_id: Uuid,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> AppResult<Option<Message>>;

    /// Remove a message owned by `sender_id`. `false` when nothing was removed.
    fn delete_owned(&self, id: i64, sender_id: Uuid) -> AppResult<bool>;

    /// Everyone `viewer` has sent to or received from, deduplicated.
    fn partner_ids(&self, viewer: Uuid) -> AppResult<Vec<Uuid>>;

    fn last_message_between(&self, a: Uuid, b: Uuid) -> AppResult<Option<Message>>;

    /// Live unread counts for `viewer`, keyed by sender. Senders with nothing
    /// unread are absent.
    fn unread_counts(&self, viewer: Uuid) -> AppResult<HashMap<Uuid, i64>>;

    /// `partner -> viewer` messages still unseen become seen. With
    /// `only_ids`, rows outside that set are left alone, including lower ids
    /// whose insert committed after the caller read the thread.
    fn mark_seen(
        &self,
        viewer: Uuid,
        partner: Uuid,
        only_ids: Option<&[i64]>,
        at: DateTime<Utc>,
    ) -> AppResult<usize>;

    /// Flip every `partner -> viewer` message between seen and unseen.
    fn toggle_seen(&self, viewer: Uuid, partner: Uuid, at: DateTime<Utc>) -> AppResult<usize>;

    fn ping(&self) -> AppResult<()>;
}
