//! Role management.

use chrono::Utc;

use crate::db::SessionScope;
use crate::models::Role;
use crate::services::error::SecurityError;
use crate::services::{check_name, links, next_id};

/// CRUD for roles, scoped to one transaction.
pub struct RolesManager<'a> {
    scope: &'a mut SessionScope,
}

impl<'a> RolesManager<'a> {
    pub fn new(scope: &'a mut SessionScope) -> Self {
        Self { scope }
    }

    /// Create a role, returning the assigned id.
    pub async fn add_role(&mut self, name: &str) -> Result<i64, SecurityError> {
        self.add_role_with_id(name, None).await
    }

    pub(crate) async fn add_role_with_id(
        &mut self,
        name: &str,
        id: Option<i64>,
    ) -> Result<i64, SecurityError> {
        check_name(name)?;
        if self.get_role(name).await.is_ok() {
            return Err(SecurityError::AlreadyExists);
        }

        let id = match id {
            Some(id) => id,
            None => next_id(self.scope.conn(), "roles").await?,
        };
        sqlx::query("INSERT INTO roles (id, name, created_at) VALUES (?, ?, ?)")
            .bind(id)
            .bind(name)
            .bind(Utc::now())
            .execute(self.scope.conn())
            .await?;

        tracing::debug!(role = name, id, "role added");
        Ok(id)
    }

    pub async fn get_role(&mut self, name: &str) -> Result<Role, SecurityError> {
        sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE name = ?")
            .bind(name)
            .fetch_optional(self.scope.conn())
            .await?
            .ok_or(SecurityError::RoleNotExist)
    }

    pub async fn get_role_id(&mut self, role_id: i64) -> Result<Role, SecurityError> {
        sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE id = ?")
            .bind(role_id)
            .fetch_optional(self.scope.conn())
            .await?
            .ok_or(SecurityError::RoleNotExist)
    }

    /// All roles in insertion (id) order.
    pub async fn get_roles(&mut self) -> Result<Vec<Role>, SecurityError> {
        Ok(sqlx::query_as::<_, Role>("SELECT * FROM roles ORDER BY id")
            .fetch_all(self.scope.conn())
            .await?)
    }

    /// Rename a role. Built-ins are protected; `Ok(false)` no-op when the id
    /// does not exist.
    pub async fn update_role(&mut self, role_id: i64, name: &str) -> Result<bool, SecurityError> {
        if role_id < crate::MAX_ID_RESERVED {
            return Err(SecurityError::ProtectedResource(role_id));
        }
        check_name(name)?;
        if let Ok(existing) = self.get_role(name).await {
            if existing.id != role_id {
                return Err(SecurityError::AlreadyExists);
            }
        }

        let done = sqlx::query("UPDATE roles SET name = ? WHERE id = ?")
            .bind(name)
            .bind(role_id)
            .execute(self.scope.conn())
            .await?;
        Ok(done.rows_affected() > 0)
    }

    /// Delete a role and every relationship row pointing at it. Built-ins are
    /// protected.
    pub async fn delete_role(&mut self, role_id: i64) -> Result<bool, SecurityError> {
        if role_id < crate::MAX_ID_RESERVED {
            return Err(SecurityError::ProtectedResource(role_id));
        }

        let done = sqlx::query("DELETE FROM roles WHERE id = ?")
            .bind(role_id)
            .execute(self.scope.conn())
            .await?;
        if done.rows_affected() == 0 {
            return Ok(false);
        }

        links::remove_all_for_object(self.scope.conn(), &links::USER_ROLES, role_id).await?;
        links::remove_all_for_subject(self.scope.conn(), &links::ROLES_POLICIES, role_id).await?;
        links::remove_all_for_subject(self.scope.conn(), &links::ROLES_RULES, role_id).await?;
        sqlx::query("DELETE FROM token_rules WHERE subject_kind = 'role' AND subject_id = ?")
            .bind(role_id)
            .execute(self.scope.conn())
            .await?;

        tracing::debug!(id = role_id, "role deleted");
        Ok(true)
    }

    pub async fn delete_role_by_name(&mut self, name: &str) -> Result<bool, SecurityError> {
        let role = self.get_role(name).await?;
        self.delete_role(role.id).await
    }

    /// Remove every non-built-in role. Returns how many were deleted; the
    /// built-ins that remain are visible through `get_roles`.
    pub async fn delete_all_roles(&mut self) -> Result<u64, SecurityError> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM roles WHERE id >= ? ORDER BY id")
            .bind(crate::MAX_ID_RESERVED)
            .fetch_all(self.scope.conn())
            .await?;
        let mut removed = 0;
        for id in ids {
            if self.delete_role(id).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
