//! User management.

use chrono::Utc;

use crate::db::SessionScope;
use crate::models::User;
use crate::services::error::SecurityError;
use crate::services::{check_name, links, next_id};
use crate::utils::{check_password, hash_password, Password, PasswordHashString};

/// CRUD and credential checks for users, scoped to one transaction.
pub struct AuthenticationManager<'a> {
    scope: &'a mut SessionScope,
}

impl<'a> AuthenticationManager<'a> {
    pub fn new(scope: &'a mut SessionScope) -> Self {
        Self { scope }
    }

    /// Register a user. The password is hashed before it reaches storage.
    /// Returns the assigned id.
    pub async fn add_user(&mut self, username: &str, password: &str) -> Result<i64, SecurityError> {
        let digest = hash_password(&Password::new(password))?;
        self.add_user_with_id(username, digest.as_str(), false, None)
            .await
    }

    /// Insert a user row with an already-hashed password, optionally pinning
    /// the id (seeding and migration).
    pub(crate) async fn add_user_with_id(
        &mut self,
        username: &str,
        password_digest: &str,
        allow_run_as: bool,
        id: Option<i64>,
    ) -> Result<i64, SecurityError> {
        check_name(username)?;
        if self.user_exists(username).await? {
            return Err(SecurityError::AlreadyExists);
        }

        let id = match id {
            Some(id) => id,
            None => next_id(self.scope.conn(), "users").await?,
        };
        sqlx::query(
            "INSERT INTO users (id, username, password, allow_run_as, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(username)
        .bind(password_digest)
        .bind(allow_run_as)
        .bind(Utc::now())
        .execute(self.scope.conn())
        .await?;

        tracing::debug!(user = username, id, "user added");
        Ok(id)
    }

    pub async fn user_exists(&mut self, username: &str) -> Result<bool, SecurityError> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(self.scope.conn())
            .await?;
        Ok(found.is_some())
    }

    pub async fn get_user(&mut self, username: &str) -> Result<User, SecurityError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(self.scope.conn())
            .await?
            .ok_or(SecurityError::UserNotExist)
    }

    pub async fn get_user_id(&mut self, user_id: i64) -> Result<User, SecurityError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(self.scope.conn())
            .await?
            .ok_or(SecurityError::UserNotExist)
    }

    /// All users in insertion (id) order.
    pub async fn get_users(&mut self) -> Result<Vec<User>, SecurityError> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY id")
            .fetch_all(self.scope.conn())
            .await?)
    }

    /// Verify a plaintext password against the stored digest.
    pub async fn check_user(&mut self, username: &str, password: &str) -> Result<bool, SecurityError> {
        match self.get_user(username).await {
            Ok(user) => check_password(
                &Password::new(password),
                &PasswordHashString::new(user.password),
            ),
            Err(SecurityError::UserNotExist) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Change a user's password, re-hashing it. `Ok(false)` no-op when the id
    /// does not exist.
    pub async fn update_user(&mut self, user_id: i64, password: &str) -> Result<bool, SecurityError> {
        let digest = hash_password(&Password::new(password))?;
        let done = sqlx::query("UPDATE users SET password = ? WHERE id = ?")
            .bind(digest.as_str())
            .bind(user_id)
            .execute(self.scope.conn())
            .await?;
        Ok(done.rows_affected() > 0)
    }

    /// Set the run-as capability flag. `Ok(false)` no-op when the id does not
    /// exist.
    pub async fn edit_run_as(&mut self, user_id: i64, allow_run_as: bool) -> Result<bool, SecurityError> {
        let done = sqlx::query("UPDATE users SET allow_run_as = ? WHERE id = ?")
            .bind(allow_run_as)
            .bind(user_id)
            .execute(self.scope.conn())
            .await?;
        Ok(done.rows_affected() > 0)
    }

    /// Delete a user and its role bindings. Built-in users are protected.
    pub async fn delete_user(&mut self, user_id: i64) -> Result<bool, SecurityError> {
        if user_id < crate::MAX_ID_RESERVED {
            return Err(SecurityError::ProtectedResource(user_id));
        }

        let done = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user_id)
            .execute(self.scope.conn())
            .await?;
        if done.rows_affected() == 0 {
            return Ok(false);
        }

        // The user's whole link set goes with it; role-side ordering is
        // unaffected since levels are kept per user.
        links::remove_all_for_subject(self.scope.conn(), &links::USER_ROLES, user_id).await?;
        sqlx::query("DELETE FROM token_rules WHERE subject_kind = 'user' AND subject_id = ?")
            .bind(user_id)
            .execute(self.scope.conn())
            .await?;

        tracing::debug!(id = user_id, "user deleted");
        Ok(true)
    }

    /// Remove every non-built-in user. Returns how many were deleted.
    pub async fn delete_all_users(&mut self) -> Result<u64, SecurityError> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM users WHERE id >= ? ORDER BY id")
            .bind(crate::MAX_ID_RESERVED)
            .fetch_all(self.scope.conn())
            .await?;
        let mut removed = 0;
        for id in ids {
            if self.delete_user(id).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
