//! User↔role bindings.
//!
//! The `level` of a binding is the zero-based precedence of the role within
//! that user; `get_all_roles_from_user` returns roles in that order.

use crate::db::SessionScope;
use crate::models::{Role, User};
use crate::services::error::SecurityError;
use crate::services::{ensure_role, ensure_user, links};

pub struct UserRolesManager<'a> {
    scope: &'a mut SessionScope,
}

impl<'a> UserRolesManager<'a> {
    pub fn new(scope: &'a mut SessionScope) -> Self {
        Self { scope }
    }

    /// Whether the binding exists. A missing user or role is reported as its
    /// own signal, distinct from a missing link.
    pub async fn exist_user_role(&mut self, user_id: i64, role_id: i64) -> Result<bool, SecurityError> {
        ensure_user(self.scope.conn(), user_id).await?;
        ensure_role(self.scope.conn(), role_id).await?;
        links::exists(self.scope.conn(), &links::USER_ROLES, user_id, role_id).await
    }

    /// Bind a role to a user, at `position` when given (clamped), appended
    /// otherwise. An existing binding is a no-op success (`Ok(false)`).
    pub async fn add_role_to_user(
        &mut self,
        user_id: i64,
        role_id: i64,
        position: Option<i64>,
    ) -> Result<bool, SecurityError> {
        ensure_user(self.scope.conn(), user_id).await?;
        ensure_role(self.scope.conn(), role_id).await?;
        links::insert(self.scope.conn(), &links::USER_ROLES, user_id, role_id, position).await
    }

    /// Unbind a role, closing the precedence gap. `Ok(false)` when the
    /// binding was not there.
    pub async fn remove_role_in_user(&mut self, user_id: i64, role_id: i64) -> Result<bool, SecurityError> {
        ensure_user(self.scope.conn(), user_id).await?;
        ensure_role(self.scope.conn(), role_id).await?;
        links::remove(self.scope.conn(), &links::USER_ROLES, user_id, role_id).await
    }

    /// Swap one bound role for another, keeping the old role's precedence.
    /// `Ok(false)` when the old binding does not exist.
    pub async fn replace_user_role(
        &mut self,
        user_id: i64,
        actual_role_id: i64,
        new_role_id: i64,
    ) -> Result<bool, SecurityError> {
        ensure_user(self.scope.conn(), user_id).await?;
        ensure_role(self.scope.conn(), actual_role_id).await?;
        ensure_role(self.scope.conn(), new_role_id).await?;
        links::replace(
            self.scope.conn(),
            &links::USER_ROLES,
            user_id,
            actual_role_id,
            new_role_id,
        )
        .await
    }

    pub async fn remove_all_roles_in_user(&mut self, user_id: i64) -> Result<u64, SecurityError> {
        ensure_user(self.scope.conn(), user_id).await?;
        links::remove_all_for_subject(self.scope.conn(), &links::USER_ROLES, user_id).await
    }

    pub async fn remove_all_users_in_role(&mut self, role_id: i64) -> Result<u64, SecurityError> {
        ensure_role(self.scope.conn(), role_id).await?;
        links::remove_all_for_object(self.scope.conn(), &links::USER_ROLES, role_id).await
    }

    /// The user's roles, highest precedence (level 0) first.
    pub async fn get_all_roles_from_user(&mut self, user_id: i64) -> Result<Vec<Role>, SecurityError> {
        Ok(sqlx::query_as::<_, Role>(
            "SELECT r.* FROM roles r
             JOIN user_roles l ON l.role_id = r.id
             WHERE l.user_id = ?
             ORDER BY l.level",
        )
        .bind(user_id)
        .fetch_all(self.scope.conn())
        .await?)
    }

    /// Every user holding the role. No defined order.
    pub async fn get_all_users_from_role(&mut self, role_id: i64) -> Result<Vec<User>, SecurityError> {
        Ok(sqlx::query_as::<_, User>(
            "SELECT u.* FROM users u
             JOIN user_roles l ON l.user_id = u.id
             WHERE l.role_id = ?",
        )
        .bind(role_id)
        .fetch_all(self.scope.conn())
        .await?)
    }
}
