use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Moderator,
    Admin,
}

/// JWT payload issued by the auth service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: UserRole,
    pub iat: i64,
    pub exp: i64,
    pub jti: Uuid,
}

impl Claims {
    pub fn new(user_id: Uuid, role: UserRole, duration_secs: i64) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub: user_id,
            role,
            iat: now,
            exp: now + duration_secs,
            jti: Uuid::now_v7(),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }
}

/// The authenticated viewer, injected into handlers from the bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: UserRole,
}

impl AuthUser {
    /// Moderators and admins bypass per-user feature gates.
    pub fn is_staff(&self) -> bool {
        matches!(self.role, UserRole::Moderator | UserRole::Admin)
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            role: claims.role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_value(UserRole::Moderator).unwrap();
        assert_eq!(json, "moderator");
        let role: UserRole = serde_json::from_value(serde_json::json!("admin")).unwrap();
        assert_eq!(role, UserRole::Admin);
    }

    #[test]
    fn expiry_and_staff_flags() {
        let claims = Claims::new(Uuid::new_v4(), UserRole::User, 60);
        assert!(!claims.is_expired());
        assert!(!AuthUser::from(claims).is_staff());

        let stale = Claims::new(Uuid::new_v4(), UserRole::Admin, -60);
        assert!(stale.is_expired());
        assert!(AuthUser::from(stale).is_staff());
    }
}
