use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use wayfare_shared::errors::{AppError, AppResult};

use super::MessageStore;
use crate::models::{Message, NewMessage};

#[derive(Default)]
struct Rows {
    last_id: i64,
    by_id: BTreeMap<i64, Message>,
}

/// In-process store. One lock per operation gives every call the same
/// all-or-nothing behaviour as a single SQL statement.
#[derive(Default)]
pub struct MemoryMessageStore {
    rows: RwLock<Rows>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> AppResult<RwLockReadGuard<'_, Rows>> {
        self.rows
            .read()
            .map_err(|_| AppError::internal("message store lock poisoned"))
    }

    fn write(&self) -> AppResult<RwLockWriteGuard<'_, Rows>> {
        self.rows
            .write()
            .map_err(|_| AppError::internal("message store lock poisoned"))
    }
}

impl MessageStore for MemoryMessageStore {
    fn insert(&self, new_message: NewMessage) -> AppResult<Message> {
        let mut rows = self.write()?;
        rows.last_id += 1;

        let message = Message {
            id: rows.last_id,
            sender_id: new_message.sender_id,
            receiver_id: new_message.receiver_id,
            content: new_message.content,
            created_at: new_message.created_at,
            seen: new_message.seen,
            seen_at: None,
            edited_at: None,
        };
        rows.by_id.insert(message.id, message.clone());

        Ok(message)
    }

    fn find(&self, id: i64) -> AppResult<Option<Message>> {
        Ok(self.read()?.by_id.get(&id).cloned())
    }

    fn list_between(&self, a: Uuid, b: Uuid) -> AppResult<Vec<Message>> {
        let rows = self.read()?;
        let mut items: Vec<Message> = rows
            .by_id
            .values()
            .filter(|m| m.is_between(a, b))
            .cloned()
            .collect();
        items.sort_by_key(|m| (m.created_at, m.id));
        Ok(items)
    }

    fn update_content(
        &self,
        id: i64,
        sender_id: Uuid,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> AppResult<Option<Message>> {
        let mut rows = self.write()?;
        let updated = rows
            .by_id
            .get_mut(&id)
            .filter(|m| m.sender_id == sender_id)
            .map(|m| {
                m.content = content.to_string();
                m.edited_at = Some(edited_at);
                m.clone()
            });
        Ok(updated)
    }

    fn delete_owned(&self, id: i64, sender_id: Uuid) -> AppResult<bool> {
        let mut rows = self.write()?;
        let owned = rows.by_id.get(&id).is_some_and(|m| m.sender_id == sender_id);
        if owned {
            rows.by_id.remove(&id);
        }
        Ok(owned)
    }

    fn partner_ids(&self, viewer: Uuid) -> AppResult<Vec<Uuid>> {
        let rows = self.read()?;
        let mut seen = HashSet::new();
        let partners = rows
            .by_id
            .values()
            .filter_map(|m| {
                if m.sender_id == viewer {
                    Some(m.receiver_id)
                } else if m.receiver_id == viewer {
                    Some(m.sender_id)
                } else {
                    None
                }
            })
            .filter(|id| seen.insert(*id))
            .collect();
        Ok(partners)
    }

    fn last_message_between(&self, a: Uuid, b: Uuid) -> AppResult<Option<Message>> {
        let rows = self.read()?;
        let last = rows
            .by_id
            .values()
            .filter(|m| m.is_between(a, b))
            .max_by_key(|m| (m.created_at, m.id))
            .cloned();
        Ok(last)
    }

    fn unread_counts(&self, viewer: Uuid) -> AppResult<HashMap<Uuid, i64>> {
        let rows = self.read()?;
        let mut counts = HashMap::new();
        for m in rows.by_id.values().filter(|m| m.is_unread_by(viewer)) {
            *counts.entry(m.sender_id).or_insert(0) += 1;
        }
        Ok(counts)
    }

    fn mark_seen(
        &self,
        viewer: Uuid,
        partner: Uuid,
        only_ids: Option<&[i64]>,
        at: DateTime<Utc>,
    ) -> AppResult<usize> {
        let only: Option<HashSet<i64>> = only_ids.map(|ids| ids.iter().copied().collect());
        let mut rows = self.write()?;
        let mut updated = 0;
        for m in rows.by_id.values_mut() {
            let selected = only.as_ref().map_or(true, |ids| ids.contains(&m.id));
            if m.sender_id == partner && m.is_unread_by(viewer) && selected {
                m.mark_seen(at);
                updated += 1;
            }
        }
        Ok(updated)
    }

    fn toggle_seen(&self, viewer: Uuid, partner: Uuid, at: DateTime<Utc>) -> AppResult<usize> {
        let mut rows = self.write()?;
        let mut updated = 0;
        for m in rows
            .by_id
            .values_mut()
            .filter(|m| m.sender_id == partner && m.receiver_id == viewer)
        {
            m.toggle_seen(at);
            updated += 1;
        }
        Ok(updated)
    }

    fn ping(&self) -> AppResult<()> {
        self.read().map(|_| ())
    }
}
