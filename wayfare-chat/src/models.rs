use chrono::{DateTime, Utc};
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, Output, ToSql};
use diesel::sql_types::Bool;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::messages;

// --- SeenState ---

/// Receiver-side read state of a single message.
///
/// Stored as a boolean column; the time of the last transition to `Seen`
/// lives separately in `Message::seen_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Bool)]
#[serde(rename_all = "lowercase")]
pub enum SeenState {
    Unseen,
    Seen,
}

impl SeenState {
    pub fn from_flag(seen: bool) -> Self {
        if seen {
            Self::Seen
        } else {
            Self::Unseen
        }
    }

    pub fn is_seen(self) -> bool {
        matches!(self, Self::Seen)
    }

    /// The state a manual toggle moves to. Applying it twice is the identity.
    pub fn toggled(self) -> Self {
        match self {
            Self::Unseen => Self::Seen,
            Self::Seen => Self::Unseen,
        }
    }
}

impl ToSql<Bool, Pg> for SeenState {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        match self {
            Self::Seen => <bool as ToSql<Bool, Pg>>::to_sql(&true, out),
            Self::Unseen => <bool as ToSql<Bool, Pg>>::to_sql(&false, out),
        }
    }
}

impl FromSql<Bool, Pg> for SeenState {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        <bool as FromSql<Bool, Pg>>::from_sql(bytes).map(Self::from_flag)
    }
}

// --- Message ---

#[derive(Debug, Queryable, Identifiable, Serialize, Deserialize, Clone, PartialEq)]
#[diesel(table_name = messages)]
pub struct Message {
    pub id: i64,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub seen: SeenState,
    pub seen_at: Option<DateTime<Utc>>,
    pub edited_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn is_between(&self, a: Uuid, b: Uuid) -> bool {
        (self.sender_id == a && self.receiver_id == b) || (self.sender_id == b && self.receiver_id == a)
    }

    /// True when `viewer` received this message and has not seen it yet.
    pub fn is_unread_by(&self, viewer: Uuid) -> bool {
        self.receiver_id == viewer && !self.seen.is_seen()
    }

    /// Apply a manual toggle to this row.
    pub fn toggle_seen(&mut self, at: DateTime<Utc>) {
        self.seen = self.seen.toggled();
        self.seen_at = match self.seen {
            SeenState::Seen => Some(at),
            SeenState::Unseen => None,
        };
    }

    pub fn mark_seen(&mut self, at: DateTime<Utc>) {
        if !self.seen.is_seen() {
            self.seen = SeenState::Seen;
            self.seen_at = Some(at);
        }
    }
}

#[derive(Debug, Insertable, Clone)]
#[diesel(table_name = messages)]
pub struct NewMessage {
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub seen: SeenState,
}

impl NewMessage {
    pub fn new(sender_id: Uuid, receiver_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            sender_id,
            receiver_id,
            content: content.into(),
            created_at: Utc::now(),
            seen: SeenState::Unseen,
        }
    }
}
