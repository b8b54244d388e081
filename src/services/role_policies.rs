//! Role↔policy links, ordered by policy precedence within the role.

use crate::db::SessionScope;
use crate::models::{Policy, Role};
use crate::services::error::SecurityError;
use crate::services::{ensure_policy, ensure_role, links};

pub struct RolesPoliciesManager<'a> {
    scope: &'a mut SessionScope,
}

impl<'a> RolesPoliciesManager<'a> {
    pub fn new(scope: &'a mut SessionScope) -> Self {
        Self { scope }
    }

    /// Whether the link exists; missing endpoints get their own signals.
    pub async fn exist_role_policy(&mut self, role_id: i64, policy_id: i64) -> Result<bool, SecurityError> {
        ensure_role(self.scope.conn(), role_id).await?;
        ensure_policy(self.scope.conn(), policy_id).await?;
        links::exists(self.scope.conn(), &links::ROLES_POLICIES, role_id, policy_id).await
    }

    /// Attach a policy to a role at `position` (clamped) or appended. An
    /// existing link is a no-op success (`Ok(false)`).
    pub async fn add_policy_to_role(
        &mut self,
        role_id: i64,
        policy_id: i64,
        position: Option<i64>,
    ) -> Result<bool, SecurityError> {
        ensure_role(self.scope.conn(), role_id).await?;
        ensure_policy(self.scope.conn(), policy_id).await?;
        links::insert(self.scope.conn(), &links::ROLES_POLICIES, role_id, policy_id, position).await
    }

    /// Detach a policy, closing the precedence gap.
    pub async fn remove_policy_in_role(&mut self, role_id: i64, policy_id: i64) -> Result<bool, SecurityError> {
        ensure_role(self.scope.conn(), role_id).await?;
        ensure_policy(self.scope.conn(), policy_id).await?;
        links::remove(self.scope.conn(), &links::ROLES_POLICIES, role_id, policy_id).await
    }

    /// Swap one attached policy for another at the same precedence.
    /// `Ok(false)` when the old link does not exist.
    pub async fn replace_role_policy(
        &mut self,
        role_id: i64,
        current_policy_id: i64,
        new_policy_id: i64,
    ) -> Result<bool, SecurityError> {
        ensure_role(self.scope.conn(), role_id).await?;
        ensure_policy(self.scope.conn(), current_policy_id).await?;
        ensure_policy(self.scope.conn(), new_policy_id).await?;
        links::replace(
            self.scope.conn(),
            &links::ROLES_POLICIES,
            role_id,
            current_policy_id,
            new_policy_id,
        )
        .await
    }

    pub async fn remove_all_policies_in_role(&mut self, role_id: i64) -> Result<u64, SecurityError> {
        ensure_role(self.scope.conn(), role_id).await?;
        links::remove_all_for_subject(self.scope.conn(), &links::ROLES_POLICIES, role_id).await
    }

    pub async fn remove_all_roles_in_policy(&mut self, policy_id: i64) -> Result<u64, SecurityError> {
        ensure_policy(self.scope.conn(), policy_id).await?;
        links::remove_all_for_object(self.scope.conn(), &links::ROLES_POLICIES, policy_id).await
    }

    /// The role's policies, highest precedence (level 0) first.
    pub async fn get_all_policies_from_role(&mut self, role_id: i64) -> Result<Vec<Policy>, SecurityError> {
        Ok(sqlx::query_as::<_, Policy>(
            "SELECT p.* FROM policies p
             JOIN roles_policies l ON l.policy_id = p.id
             WHERE l.role_id = ?
             ORDER BY l.level",
        )
        .bind(role_id)
        .fetch_all(self.scope.conn())
        .await?)
    }

    /// Every role carrying the policy. No defined order.
    pub async fn get_all_roles_from_policy(&mut self, policy_id: i64) -> Result<Vec<Role>, SecurityError> {
        Ok(sqlx::query_as::<_, Role>(
            "SELECT r.* FROM roles r
             JOIN roles_policies l ON l.role_id = r.id
             WHERE l.policy_id = ?",
        )
        .bind(policy_id)
        .fetch_all(self.scope.conn())
        .await?)
    }
}
