use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use diesel::dsl::count_star;
use diesel::expression::BoxableExpression;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::query_builder::{QueryFragment, QueryId};
use diesel::sql_types::{Bool, Timestamptz, Uuid as SqlUuid};
use uuid::Uuid;

use wayfare_shared::clients::db::{checkout, DbConn, DbPool};
use wayfare_shared::errors::AppResult;

use super::MessageStore;
use crate::models::{Message, NewMessage, SeenState};
use crate::schema::messages;

pub struct PgMessageStore {
    pool: DbPool,
}

impl PgMessageStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl MessageStore for PgMessageStore {
    fn insert(&self, new_message: NewMessage) -> AppResult<Message> {
        let mut conn = checkout(&self.pool)?;

        let message = diesel::insert_into(messages::table)
            .values(&new_message)
            .get_result::<Message>(&mut conn)?;

        Ok(message)
    }

    fn find(&self, id: i64) -> AppResult<Option<Message>> {
        let mut conn = checkout(&self.pool)?;

        let message = messages::table
            .find(id)
            .first::<Message>(&mut conn)
            .optional()?;

        Ok(message)
    }

    fn list_between(&self, a: Uuid, b: Uuid) -> AppResult<Vec<Message>> {
        let mut conn = checkout(&self.pool)?;

        let items = messages::table
            .filter(
                messages::sender_id.eq(a).and(messages::receiver_id.eq(b))
                    .or(messages::sender_id.eq(b).and(messages::receiver_id.eq(a))),
            )
            .order((messages::created_at.asc(), messages::id.asc()))
            .load::<Message>(&mut conn)?;

        Ok(items)
    }

    fn update_content(
        &self,
        id: i64,
        sender_id: Uuid,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> AppResult<Option<Message>> {
        let mut conn = checkout(&self.pool)?;

        // Conditional on ownership so a concurrent delete cannot be undone.
        let updated = diesel::update(
            messages::table
                .filter(messages::id.eq(id))
                .filter(messages::sender_id.eq(sender_id)),
        )
        .set((
            messages::content.eq(content),
            messages::edited_at.eq(Some(edited_at)),
        ))
        .get_result::<Message>(&mut conn)
        .optional()?;

        Ok(updated)
    }

    fn delete_owned(&self, id: i64, sender_id: Uuid) -> AppResult<bool> {
        let mut conn = checkout(&self.pool)?;

        let deleted = diesel::delete(
            messages::table
                .filter(messages::id.eq(id))
                .filter(messages::sender_id.eq(sender_id)),
        )
        .execute(&mut conn)?;

        Ok(deleted > 0)
    }

    fn partner_ids(&self, viewer: Uuid) -> AppResult<Vec<Uuid>> {
        let mut conn = checkout(&self.pool)?;

        let senders: Vec<Uuid> = messages::table
            .filter(messages::receiver_id.eq(viewer))
            .select(messages::sender_id)
            .distinct()
            .load::<Uuid>(&mut conn)?;

        let receivers: Vec<Uuid> = messages::table
            .filter(messages::sender_id.eq(viewer))
            .select(messages::receiver_id)
            .distinct()
            .load::<Uuid>(&mut conn)?;

        let mut seen = HashSet::with_capacity(senders.len() + receivers.len());
        let partners = senders
            .into_iter()
            .chain(receivers)
            .filter(|id| seen.insert(*id))
            .collect();

        Ok(partners)
    }

    fn last_message_between(&self, a: Uuid, b: Uuid) -> AppResult<Option<Message>> {
        let mut conn = checkout(&self.pool)?;

        let last = messages::table
            .filter(
                messages::sender_id.eq(a).and(messages::receiver_id.eq(b))
                    .or(messages::sender_id.eq(b).and(messages::receiver_id.eq(a))),
            )
            .order((messages::created_at.desc(), messages::id.desc()))
            .first::<Message>(&mut conn)
            .optional()?;

        Ok(last)
    }

    fn unread_counts(&self, viewer: Uuid) -> AppResult<HashMap<Uuid, i64>> {
        let mut conn = checkout(&self.pool)?;

        let rows: Vec<(Uuid, i64)> = messages::table
            .filter(messages::receiver_id.eq(viewer))
            .filter(messages::seen.eq(SeenState::Unseen))
            .group_by(messages::sender_id)
            .select((messages::sender_id, count_star()))
            .load::<(Uuid, i64)>(&mut conn)?;

        Ok(rows.into_iter().collect())
    }

    fn mark_seen(
        &self,
        viewer: Uuid,
        partner: Uuid,
        only_ids: Option<&[i64]>,
        at: DateTime<Utc>,
    ) -> AppResult<usize> {
        if only_ids.is_some_and(|ids| ids.is_empty()) {
            return Ok(0);
        }
        let mut conn = checkout(&self.pool)?;

        let updated = diesel::update(messages::table.filter(unseen_inbound(viewer, partner, only_ids)))
            .set((
                messages::seen.eq(SeenState::Seen),
                messages::seen_at.eq(Some(at)),
            ))
            .execute(&mut conn)?;

        Ok(updated)
    }

    fn toggle_seen(&self, viewer: Uuid, partner: Uuid, at: DateTime<Utc>) -> AppResult<usize> {
        let mut conn = checkout(&self.pool)?;
        let updated = toggle_seen_query(viewer, partner, at).execute(&mut conn)?;
        Ok(updated)
    }

    fn ping(&self) -> AppResult<()> {
        let mut conn = checkout(&self.pool)?;
        diesel::sql_query("SELECT 1").execute(&mut conn)?;
        Ok(())
    }
}

type InboundFilter = Box<dyn BoxableExpression<messages::table, Pg, SqlType = Bool>>;

/// Unseen `partner -> viewer` rows, optionally restricted to `only_ids`.
fn unseen_inbound(viewer: Uuid, partner: Uuid, only_ids: Option<&[i64]>) -> InboundFilter {
    let base = messages::sender_id
        .eq(partner)
        .and(messages::receiver_id.eq(viewer))
        .and(messages::seen.eq(SeenState::Unseen));

    match only_ids {
        Some(ids) => Box::new(base.and(messages::id.eq_any(ids.to_vec()))),
        None => Box::new(base),
    }
}

// Right-hand sides read the pre-update row, so `seen_at` follows the new state.
const TOGGLE_SEEN_SQL: &str = "UPDATE messages \
     SET seen = NOT seen, seen_at = CASE WHEN seen THEN NULL ELSE $3 END \
     WHERE sender_id = $1 AND receiver_id = $2";

fn toggle_seen_query(
    viewer: Uuid,
    partner: Uuid,
    at: DateTime<Utc>,
) -> impl RunQueryDsl<DbConn> + QueryFragment<Pg> + QueryId {
    diesel::sql_query(TOGGLE_SEEN_SQL)
        .bind::<SqlUuid, _>(partner)
        .bind::<SqlUuid, _>(viewer)
        .bind::<Timestamptz, _>(at)
}
