use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::authorize::Role;

const USER_COLUMNS: &str = "id, name, email, password_hash, role, password_changed_at, \
     password_reset_token_hash, password_reset_expires_at, active, created_at";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    #[serde(skip_serializing)]
    pub password_changed_at: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub password_reset_token_hash: Option<String>,
    #[serde(skip_serializing)]
    pub password_reset_expires_at: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub active: bool,
    pub created_at: OffsetDateTime,
}

impl User {
    /// True when the password changed strictly after the token was issued.
    /// Both sides compare in whole seconds, matching the token's `iat`.
    pub fn changed_password_after(&self, token_iat: i64) -> bool {
        match self.password_changed_at {
            Some(changed_at) => changed_at.unix_timestamp() > token_iat,
            None => false,
        }
    }

    /// Find a live user by (normalized) email.
    pub async fn find_by_email(db: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND active = TRUE"
        ))
        .bind(email)
        .fetch_optional(db)
        .await
    }

    /// Resolve a credential subject to a live user. Deactivated accounts are
    /// indistinguishable from deleted ones here.
    pub async fn find_active_by_id(db: &PgPool, id: Uuid) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND active = TRUE"
        ))
        .bind(id)
        .fetch_optional(db)
        .await
    }

    pub async fn create(
        db: &PgPool,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (name, email, password_hash) VALUES ($1, $2, $3) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .fetch_one(db)
        .await
    }

    pub async fn list(db: &PgPool, limit: i64, offset: i64) -> Result<Vec<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE active = TRUE \
             ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await
    }

    pub async fn update_profile(
        db: &PgPool,
        id: Uuid,
        name: Option<&str>,
        email: Option<&str>,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET name = COALESCE($2, name), email = COALESCE($3, email) \
             WHERE id = $1 AND active = TRUE RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(name)
        .bind(email)
        .fetch_one(db)
        .await
    }

    /// Soft delete. The row stays; every lookup above stops seeing it.
    pub async fn deactivate(db: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET active = FALSE WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Replace the password hash and stamp the rotation time. Stamping only
    /// happens through this and `reset_password`, never on creation.
    pub async fn change_password(
        db: &PgPool,
        id: Uuid,
        new_hash: &str,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET password_hash = $2, password_changed_at = now() \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(new_hash)
        .fetch_one(db)
        .await
    }

    /// Store the hash + expiry of a freshly issued reset secret. A second
    /// issuance overwrites the first; at most one reset is pending per user.
    pub async fn set_reset_token(
        db: &PgPool,
        id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE users SET password_reset_token_hash = $2, password_reset_expires_at = $3 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Drop any pending reset. Used both for abandonment and for rolling
    /// back when the mail dispatch fails.
    pub async fn clear_reset_token(db: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE users SET password_reset_token_hash = NULL, password_reset_expires_at = NULL \
             WHERE id = $1",
        )
        .bind(id)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Match a stored reset hash that has not expired yet. Wrong secret and
    /// expired secret are indistinguishable to the caller.
    pub async fn find_by_reset_token(
        db: &PgPool,
        token_hash: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE password_reset_token_hash = $1 AND password_reset_expires_at > now() \
             AND active = TRUE"
        ))
        .bind(token_hash)
        .fetch_optional(db)
        .await
    }

    /// Consume a reset: new hash, rotation stamp, reset fields cleared, all
    /// in one statement.
    pub async fn reset_password(
        db: &PgPool,
        id: Uuid,
        new_hash: &str,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET password_hash = $2, password_changed_at = now(), \
             password_reset_token_hash = NULL, password_reset_expires_at = NULL \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(new_hash)
        .fetch_one(db)
        .await
    }
}

#[cfg(test)]
impl User {
    pub(crate) fn fixture(role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: "Test User".into(),
            email: "test@example.com".into(),
            password_hash: "$argon2id$fake".into(),
            role,
            password_changed_at: None,
            password_reset_token_hash: None,
            password_reset_expires_at: None,
            active: true,
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[test]
    fn never_rotated_password_is_never_stale() {
        let user = User::fixture(Role::User);
        assert!(!user.changed_password_after(0));
        assert!(!user.changed_password_after(OffsetDateTime::now_utc().unix_timestamp()));
    }

    #[test]
    fn token_issued_before_rotation_is_stale() {
        let mut user = User::fixture(Role::User);
        let now = OffsetDateTime::now_utc();
        user.password_changed_at = Some(now);
        assert!(user.changed_password_after(now.unix_timestamp() - 100));
    }

    #[test]
    fn token_issued_after_rotation_is_accepted() {
        let mut user = User::fixture(Role::User);
        let now = OffsetDateTime::now_utc();
        user.password_changed_at = Some(now - Duration::hours(1));
        assert!(!user.changed_password_after(now.unix_timestamp()));
    }

    #[test]
    fn token_issued_in_the_rotation_second_is_accepted() {
        // A credential minted immediately after a change shares the second
        // with the rotation stamp and must stay valid.
        let mut user = User::fixture(Role::User);
        let now = OffsetDateTime::now_utc();
        user.password_changed_at = Some(now);
        assert!(!user.changed_password_after(now.unix_timestamp()));
    }

    #[test]
    fn password_hash_is_not_serialized() {
        let user = User::fixture(Role::User);
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("password_hash"));
        assert!(!json.contains("argon2"));
        assert!(json.contains("test@example.com"));
    }
}
