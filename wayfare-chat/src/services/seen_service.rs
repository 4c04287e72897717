use chrono::Utc;
use metrics::counter;
use uuid::Uuid;

use wayfare_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::Message;
use crate::store::MessageStore;

fn ensure_pair(viewer_id: Uuid, partner_id: Uuid) -> AppResult<()> {
    if viewer_id == partner_id {
        return Err(AppError::new(ErrorCode::SelfMessage, "a conversation needs two different users"));
    }
    Ok(())
}

/// Mark every unseen `partner -> viewer` message as seen.
pub fn mark_thread_seen(store: &dyn MessageStore, viewer_id: Uuid, partner_id: Uuid) -> AppResult<usize> {
    ensure_pair(viewer_id, partner_id)?;
    let updated = store.mark_seen(viewer_id, partner_id, None, Utc::now())?;
    counter!("chat_messages_marked_seen_total").increment(updated as u64);
    Ok(updated)
}

/// Like [`mark_thread_seen`], limited to the given message ids. Ids that are
/// not unseen `partner -> viewer` messages are ignored.
pub fn mark_messages_seen(
    store: &dyn MessageStore,
    viewer_id: Uuid,
    partner_id: Uuid,
    message_ids: &[i64],
) -> AppResult<usize> {
    ensure_pair(viewer_id, partner_id)?;
    let updated = store.mark_seen(viewer_id, partner_id, Some(message_ids), Utc::now())?;
    counter!("chat_messages_marked_seen_total").increment(updated as u64);
    Ok(updated)
}

/// Flip every `partner -> viewer` message between seen and unseen.
///
/// Applying it twice restores the original state. This can hide genuinely
/// unread messages, so callers gate it.
pub fn toggle_thread_seen(store: &dyn MessageStore, viewer_id: Uuid, partner_id: Uuid) -> AppResult<usize> {
    ensure_pair(viewer_id, partner_id)?;
    let updated = store.toggle_seen(viewer_id, partner_id, Utc::now())?;
    tracing::warn!(
        viewer = %viewer_id,
        partner = %partner_id,
        updated = updated,
        "seen state toggled for thread"
    );
    Ok(updated)
}

/// Load the thread for `viewer_id` and mark the inbound messages it returns as seen.
///
/// Only the returned rows are marked. A partner message whose insert commits
/// after the read stays unseen for the next fetch, even when its id is lower.
pub fn open_thread(store: &dyn MessageStore, viewer_id: Uuid, partner_id: Uuid) -> AppResult<Vec<Message>> {
    ensure_pair(viewer_id, partner_id)?;
    let mut thread = store.list_between(viewer_id, partner_id)?;

    let returned_unread: Vec<i64> = thread
        .iter()
        .filter(|m| m.is_unread_by(viewer_id))
        .map(|m| m.id)
        .collect();

    if !returned_unread.is_empty() {
        let now = Utc::now();
        let updated = store.mark_seen(viewer_id, partner_id, Some(&returned_unread), now)?;
        counter!("chat_messages_marked_seen_total").increment(updated as u64);

        for m in thread.iter_mut().filter(|m| m.is_unread_by(viewer_id)) {
            m.mark_seen(now);
        }
    }

    Ok(thread)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewMessage, SeenState};
    use crate::store::MemoryMessageStore;

    fn states(store: &MemoryMessageStore, viewer: Uuid, partner: Uuid) -> Vec<SeenState> {
        store
            .list_between(viewer, partner)
            .unwrap()
            .into_iter()
            .filter(|m| m.receiver_id == viewer)
            .map(|m| m.seen)
            .collect()
    }

    #[test]
    fn mark_seen_covers_existing_and_leaves_later_inserts_for_next_call() {
        let store = MemoryMessageStore::new();
        let (viewer, partner) = (Uuid::new_v4(), Uuid::new_v4());
        let m1 = store.insert(NewMessage::new(partner, viewer, "1")).unwrap();
        let m2 = store.insert(NewMessage::new(partner, viewer, "2")).unwrap();
        let mine = store.insert(NewMessage::new(viewer, partner, "mine")).unwrap();

        assert_eq!(mark_thread_seen(&store, viewer, partner).unwrap(), 2);
        for id in [m1.id, m2.id] {
            let m = store.find(id).unwrap().unwrap();
            assert_eq!(m.seen, SeenState::Seen);
            assert!(m.seen_at.is_some());
        }
        // Outbound messages are never touched by the viewer's reconciliation.
        assert_eq!(store.find(mine.id).unwrap().unwrap().seen, SeenState::Unseen);

        let late = store.insert(NewMessage::new(partner, viewer, "late")).unwrap();
        assert_eq!(store.find(late.id).unwrap().unwrap().seen, SeenState::Unseen);

        assert_eq!(mark_thread_seen(&store, viewer, partner).unwrap(), 1);
        assert_eq!(store.find(late.id).unwrap().unwrap().seen, SeenState::Seen);
        assert_eq!(mark_thread_seen(&store, viewer, partner).unwrap(), 0);
    }

    #[test]
    fn open_thread_marks_only_what_it_returned() {
        let store = MemoryMessageStore::new();
        let (viewer, partner) = (Uuid::new_v4(), Uuid::new_v4());
        store.insert(NewMessage::new(partner, viewer, "hi")).unwrap();
        store.insert(NewMessage::new(viewer, partner, "hey")).unwrap();

        let thread = open_thread(&store, viewer, partner).unwrap();
        assert_eq!(thread.len(), 2);
        assert_eq!(thread[0].seen, SeenState::Seen);
        assert_eq!(thread[1].seen, SeenState::Unseen);
        assert_eq!(states(&store, viewer, partner), vec![SeenState::Seen]);

        // Partner writes after the read; the next open picks it up.
        store.insert(NewMessage::new(partner, viewer, "again")).unwrap();
        assert_eq!(store.unread_counts(viewer).unwrap().get(&partner), Some(&1));
        open_thread(&store, viewer, partner).unwrap();
        assert!(store.unread_counts(viewer).unwrap().is_empty());
    }

    /// Hides chosen rows from thread reads, standing in for inserts that
    /// have taken an id but not yet committed.
    struct UncommittedRows {
        inner: MemoryMessageStore,
        hidden: Vec<i64>,
    }

    impl MessageStore for UncommittedRows {
        fn insert(&self, new_message: NewMessage) -> AppResult<Message> {
            self.inner.insert(new_message)
        }
        fn find(&self, id: i64) -> AppResult<Option<Message>> {
            self.inner.find(id)
        }
        fn list_between(&self, a: Uuid, b: Uuid) -> AppResult<Vec<Message>> {
            let mut rows = self.inner.list_between(a, b)?;
            rows.retain(|m| !self.hidden.contains(&m.id));
            Ok(rows)
        }
        fn update_content(
            &self,
            id: i64,
            sender_id: Uuid,
            content: &str,
            edited_at: chrono::DateTime<Utc>,
        ) -> AppResult<Option<Message>> {
            self.inner.update_content(id, sender_id, content, edited_at)
        }
        fn delete_owned(&self, id: i64, sender_id: Uuid) -> AppResult<bool> {
            self.inner.delete_owned(id, sender_id)
        }
        fn partner_ids(&self, viewer: Uuid) -> AppResult<Vec<Uuid>> {
            self.inner.partner_ids(viewer)
        }
        fn last_message_between(&self, a: Uuid, b: Uuid) -> AppResult<Option<Message>> {
            self.inner.last_message_between(a, b)
        }
        fn unread_counts(&self, viewer: Uuid) -> AppResult<std::collections::HashMap<Uuid, i64>> {
            self.inner.unread_counts(viewer)
        }
        fn mark_seen(
            &self,
            viewer: Uuid,
            partner: Uuid,
            only_ids: Option<&[i64]>,
            at: chrono::DateTime<Utc>,
        ) -> AppResult<usize> {
            self.inner.mark_seen(viewer, partner, only_ids, at)
        }
        fn toggle_seen(&self, viewer: Uuid, partner: Uuid, at: chrono::DateTime<Utc>) -> AppResult<usize> {
            self.inner.toggle_seen(viewer, partner, at)
        }
        fn ping(&self) -> AppResult<()> {
            self.inner.ping()
        }
    }

    #[test]
    fn open_thread_leaves_late_committing_lower_ids_unseen() {
        let inner = MemoryMessageStore::new();
        let (viewer, partner) = (Uuid::new_v4(), Uuid::new_v4());
        let late = inner.insert(NewMessage::new(partner, viewer, "slow insert")).unwrap();
        let visible = inner.insert(NewMessage::new(partner, viewer, "fast insert")).unwrap();
        let store = UncommittedRows {
            inner,
            hidden: vec![late.id],
        };

        let thread = open_thread(&store, viewer, partner).unwrap();
        assert_eq!(thread.iter().map(|m| m.id).collect::<Vec<_>>(), vec![visible.id]);
        assert_eq!(thread[0].seen, SeenState::Seen);

        assert_eq!(store.find(late.id).unwrap().unwrap().seen, SeenState::Unseen);
        assert_eq!(store.unread_counts(viewer).unwrap().get(&partner), Some(&1));
    }

    #[test]
    fn explicit_ids_ignore_outbound_and_foreign_messages() {
        let store = MemoryMessageStore::new();
        let (viewer, partner, other) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let inbound = store.insert(NewMessage::new(partner, viewer, "in")).unwrap();
        let outbound = store.insert(NewMessage::new(viewer, partner, "out")).unwrap();
        let foreign = store.insert(NewMessage::new(other, viewer, "elsewhere")).unwrap();

        let ids = [inbound.id, outbound.id, foreign.id];
        assert_eq!(mark_messages_seen(&store, viewer, partner, &ids).unwrap(), 1);
        assert_eq!(store.find(foreign.id).unwrap().unwrap().seen, SeenState::Unseen);
        assert_eq!(store.find(outbound.id).unwrap().unwrap().seen, SeenState::Unseen);
    }

    #[test]
    fn toggle_twice_restores_every_message() {
        let store = MemoryMessageStore::new();
        let (viewer, partner) = (Uuid::new_v4(), Uuid::new_v4());
        for text in ["a", "b", "c"] {
            store.insert(NewMessage::new(partner, viewer, text)).unwrap();
        }
        mark_messages_seen(&store, viewer, partner, &[1]).unwrap();
        let original = states(&store, viewer, partner);
        assert_eq!(original, vec![SeenState::Seen, SeenState::Unseen, SeenState::Unseen]);

        assert_eq!(toggle_thread_seen(&store, viewer, partner).unwrap(), 3);
        assert_eq!(
            states(&store, viewer, partner),
            vec![SeenState::Unseen, SeenState::Seen, SeenState::Seen]
        );

        toggle_thread_seen(&store, viewer, partner).unwrap();
        assert_eq!(states(&store, viewer, partner), original);
    }

    #[test]
    fn self_threads_are_rejected() {
        let store = MemoryMessageStore::new();
        let me = Uuid::new_v4();
        let err = mark_thread_seen(&store, me, me).unwrap_err();
        assert_eq!(err.code(), ErrorCode::SelfMessage);
        assert!(open_thread(&store, me, me).is_err());
    }
}
