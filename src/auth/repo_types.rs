use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 hash, not exposed in JSON
    pub role: String, // "user" or "admin"
    #[serde(skip_serializing)]
    pub password_changed_at: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub password_reset_token: Option<String>, // SHA-256 hex of the emailed token
    #[serde(skip_serializing)]
    pub password_reset_expires: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl User {
    /// True when the password was changed after the given token issue time.
    /// Tokens minted before a password change are no longer trusted.
    pub fn password_changed_after(&self, token_iat: usize) -> bool {
        match self.password_changed_at {
            Some(changed_at) => changed_at.unix_timestamp() > token_iat as i64,
            None => false,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn user_changed_at(changed_at: Option<OffsetDateTime>) -> User {
        User {
            id: Uuid::new_v4(),
            email: "t@example.com".into(),
            password_hash: "hash".into(),
            role: "user".into(),
            password_changed_at: changed_at,
            password_reset_token: None,
            password_reset_expires: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn never_changed_password_keeps_tokens_valid() {
        let user = user_changed_at(None);
        assert!(!user.password_changed_after(0));
    }

    #[test]
    fn change_after_issue_invalidates_token() {
        let now = OffsetDateTime::now_utc();
        let user = user_changed_at(Some(now));
        let iat = (now - Duration::minutes(5)).unix_timestamp() as usize;
        assert!(user.password_changed_after(iat));
    }

    #[test]
    fn change_before_issue_keeps_token_valid() {
        let now = OffsetDateTime::now_utc();
        let user = user_changed_at(Some(now - Duration::hours(1)));
        let iat = now.unix_timestamp() as usize;
        assert!(!user.password_changed_after(iat));
    }

    #[test]
    fn admin_role_check() {
        let mut user = user_changed_at(None);
        assert!(!user.is_admin());
        user.role = "admin".into();
        assert!(user.is_admin());
    }
}
