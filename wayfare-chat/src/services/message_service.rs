use chrono::Utc;
use metrics::counter;
use uuid::Uuid;

use wayfare_shared::errors::{AppError, AppResult, ErrorCode};

use crate::directory::UserDirectory;
use crate::models::{Message, NewMessage};
use crate::store::MessageStore;

pub const MAX_CONTENT_CHARS: usize = 4000;

pub fn validate_content(content: &str) -> AppResult<()> {
    if content.trim().is_empty() {
        return Err(AppError::new(ErrorCode::ValidationError, "message content is required"));
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(AppError::new(
            ErrorCode::ValidationError,
            format!("message content exceeds {MAX_CONTENT_CHARS} characters"),
        ));
    }
    Ok(())
}

fn not_found() -> AppError {
    AppError::new(ErrorCode::MessageNotFound, "message not found")
}

/// Store a new message from `sender_id` to `receiver_id`. The message starts unseen.
pub async fn send(
    store: &dyn MessageStore,
    users: &dyn UserDirectory,
    sender_id: Uuid,
    receiver_id: Uuid,
    content: &str,
) -> AppResult<Message> {
    if sender_id == receiver_id {
        return Err(AppError::new(ErrorCode::SelfMessage, "you cannot send a message to yourself"));
    }
    validate_content(content)?;

    if !users.exists(receiver_id).await? {
        return Err(AppError::new(ErrorCode::ValidationError, "receiver does not exist"));
    }

    let message = store.insert(NewMessage::new(sender_id, receiver_id, content))?;
    counter!("chat_messages_sent_total").increment(1);

    tracing::debug!(
        message_id = message.id,
        sender = %sender_id,
        receiver = %receiver_id,
        "message stored"
    );

    Ok(message)
}

pub fn list_between(store: &dyn MessageStore, a: Uuid, b: Uuid) -> AppResult<Vec<Message>> {
    if a == b {
        return Err(AppError::new(ErrorCode::SelfMessage, "a conversation needs two different users"));
    }
    store.list_between(a, b)
}

/// A single message, visible to its two participants only.
pub fn get(store: &dyn MessageStore, message_id: i64, viewer_id: Uuid) -> AppResult<Message> {
    store
        .find(message_id)?
        .filter(|m| m.sender_id == viewer_id || m.receiver_id == viewer_id)
        .ok_or_else(not_found)
}

/// Replace the content of a message. Only the sender may edit; seen state is untouched.
pub fn edit(
    store: &dyn MessageStore,
    message_id: i64,
    editor_id: Uuid,
    new_content: &str,
) -> AppResult<Message> {
    let message = store.find(message_id)?.ok_or_else(not_found)?;

    if message.sender_id != editor_id {
        return Err(AppError::new(ErrorCode::Forbidden, "you can only edit your own messages"));
    }
    validate_content(new_content)?;

    // A delete that lands between the lookup and here surfaces as not found.
    let updated = store
        .update_content(message_id, editor_id, new_content, Utc::now())?
        .ok_or_else(not_found)?;

    tracing::debug!(message_id = message_id, editor = %editor_id, "message edited");
    Ok(updated)
}

/// Hard-delete a message. Only the sender may delete.
pub fn delete(store: &dyn MessageStore, message_id: i64, requester_id: Uuid) -> AppResult<()> {
    let message = store.find(message_id)?.ok_or_else(not_found)?;

    if message.sender_id != requester_id {
        return Err(AppError::new(ErrorCode::Forbidden, "you can only delete your own messages"));
    }

    if !store.delete_owned(message_id, requester_id)? {
        return Err(not_found());
    }

    tracing::debug!(message_id = message_id, requester = %requester_id, "message deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{MemoryUserDirectory, UserProfile};
    use crate::models::SeenState;
    use crate::store::MemoryMessageStore;

    struct Fixture {
        store: MemoryMessageStore,
        users: MemoryUserDirectory,
        a: Uuid,
        b: Uuid,
        c: Uuid,
    }

    fn fixture() -> Fixture {
        let users = MemoryUserDirectory::new();
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            users.insert(UserProfile {
                id: *id,
                display_name: None,
                avatar_url: None,
            });
        }
        Fixture {
            store: MemoryMessageStore::new(),
            users,
            a: ids[0],
            b: ids[1],
            c: ids[2],
        }
    }

    #[tokio::test]
    async fn send_then_list_contains_one_unseen_message() {
        let f = fixture();
        let before = list_between(&f.store, f.a, f.b).unwrap().len();

        let sent = send(&f.store, &f.users, f.a, f.b, "hi").await.unwrap();

        let thread = list_between(&f.store, f.b, f.a).unwrap();
        assert_eq!(thread.len(), before + 1);
        let matching: Vec<_> = thread.iter().filter(|m| m.content == "hi").collect();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].id, sent.id);
        assert_eq!(matching[0].seen, SeenState::Unseen);
        assert!(matching[0].seen_at.is_none());
    }

    #[tokio::test]
    async fn send_rejects_bad_input() {
        let f = fixture();

        let err = send(&f.store, &f.users, f.a, f.a, "me").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::SelfMessage);

        let err = send(&f.store, &f.users, f.a, f.b, "   ").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let too_long = "x".repeat(MAX_CONTENT_CHARS + 1);
        let err = send(&f.store, &f.users, f.a, f.b, &too_long).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let err = send(&f.store, &f.users, f.a, Uuid::new_v4(), "hello?").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        assert!(list_between(&f.store, f.a, f.b).unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_sends_are_independent_rows() {
        let f = fixture();
        let (r1, r2) = tokio::join!(
            send(&f.store, &f.users, f.a, f.b, "same"),
            send(&f.store, &f.users, f.a, f.b, "same"),
        );
        assert_ne!(r1.unwrap().id, r2.unwrap().id);
        assert_eq!(list_between(&f.store, f.a, f.b).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn only_the_sender_can_edit() {
        let f = fixture();
        let m = send(&f.store, &f.users, f.a, f.b, "hi").await.unwrap();

        for intruder in [f.b, f.c] {
            let err = edit(&f.store, m.id, intruder, "pwned").unwrap_err();
            assert_eq!(err.code(), ErrorCode::Forbidden);
        }
        assert_eq!(get(&f.store, m.id, f.b).unwrap().content, "hi");

        let edited = edit(&f.store, m.id, f.a, "hello").unwrap();
        assert_eq!(edited.content, "hello");
        assert!(edited.edited_at.is_some());
        assert_eq!(edited.seen, SeenState::Unseen);

        let thread = list_between(&f.store, f.b, f.a).unwrap();
        assert_eq!(thread[0].content, "hello");
    }

    #[tokio::test]
    async fn edit_validates_content_and_existence() {
        let f = fixture();
        let m = send(&f.store, &f.users, f.a, f.b, "hi").await.unwrap();

        let err = edit(&f.store, m.id, f.a, "").unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let err = edit(&f.store, m.id + 100, f.a, "x").unwrap_err();
        assert_eq!(err.code(), ErrorCode::MessageNotFound);
    }

    #[tokio::test]
    async fn delete_is_sender_only_and_not_idempotent() {
        let f = fixture();
        let m = send(&f.store, &f.users, f.a, f.b, "hi").await.unwrap();

        let err = delete(&f.store, m.id, f.b).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);
        assert!(get(&f.store, m.id, f.a).is_ok());

        delete(&f.store, m.id, f.a).unwrap();
        let err = delete(&f.store, m.id, f.a).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MessageNotFound);

        // No resurrection through a late edit.
        let err = edit(&f.store, m.id, f.a, "back").unwrap_err();
        assert_eq!(err.code(), ErrorCode::MessageNotFound);
    }

    #[tokio::test]
    async fn outsiders_cannot_read_a_message() {
        let f = fixture();
        let m = send(&f.store, &f.users, f.a, f.b, "private").await.unwrap();
        let err = get(&f.store, m.id, f.c).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MessageNotFound);
    }
}
