//! Role↔rule links. Same shape as the policy links; rules are normally
//! appended rather than positioned, but the data model is shared.

use crate::db::SessionScope;
use crate::models::{Role, Rule};
use crate::services::error::SecurityError;
use crate::services::{ensure_role, ensure_rule, links};

pub struct RolesRulesManager<'a> {
    scope: &'a mut SessionScope,
}

impl<'a> RolesRulesManager<'a> {
    pub fn new(scope: &'a mut SessionScope) -> Self {
        Self { scope }
    }

    /// Whether the link exists; missing endpoints get their own signals.
    pub async fn exist_role_rule(&mut self, role_id: i64, rule_id: i64) -> Result<bool, SecurityError> {
        ensure_role(self.scope.conn(), role_id).await?;
        ensure_rule(self.scope.conn(), rule_id).await?;
        links::exists(self.scope.conn(), &links::ROLES_RULES, role_id, rule_id).await
    }

    /// Attach a rule to a role, appended unless a position is given. An
    /// existing link is a no-op success (`Ok(false)`).
    pub async fn add_rule_to_role(
        &mut self,
        role_id: i64,
        rule_id: i64,
        position: Option<i64>,
    ) -> Result<bool, SecurityError> {
        ensure_role(self.scope.conn(), role_id).await?;
        ensure_rule(self.scope.conn(), rule_id).await?;
        links::insert(self.scope.conn(), &links::ROLES_RULES, role_id, rule_id, position).await
    }

    pub async fn remove_rule_in_role(&mut self, role_id: i64, rule_id: i64) -> Result<bool, SecurityError> {
        ensure_role(self.scope.conn(), role_id).await?;
        ensure_rule(self.scope.conn(), rule_id).await?;
        links::remove(self.scope.conn(), &links::ROLES_RULES, role_id, rule_id).await
    }

    pub async fn remove_all_rules_in_role(&mut self, role_id: i64) -> Result<u64, SecurityError> {
        ensure_role(self.scope.conn(), role_id).await?;
        links::remove_all_for_subject(self.scope.conn(), &links::ROLES_RULES, role_id).await
    }

    /// Detach a rule from every role. Built-in rules keep their wiring: the
    /// caller gets `ProtectedResource` and must skip them.
    pub async fn remove_all_roles_in_rule(&mut self, rule_id: i64) -> Result<u64, SecurityError> {
        if rule_id < crate::MAX_ID_RESERVED {
            return Err(SecurityError::ProtectedResource(rule_id));
        }
        ensure_rule(self.scope.conn(), rule_id).await?;
        links::remove_all_for_object(self.scope.conn(), &links::ROLES_RULES, rule_id).await
    }

    /// The role's rules in level order.
    pub async fn get_all_rules_from_role(&mut self, role_id: i64) -> Result<Vec<Rule>, SecurityError> {
        Ok(sqlx::query_as::<_, Rule>(
            "SELECT ru.* FROM rules ru
             JOIN roles_rules l ON l.rule_id = ru.id
             WHERE l.role_id = ?
             ORDER BY l.level",
        )
        .bind(role_id)
        .fetch_all(self.scope.conn())
        .await?)
    }

    /// Every role carrying the rule. No defined order.
    pub async fn get_all_roles_from_rule(&mut self, rule_id: i64) -> Result<Vec<Role>, SecurityError> {
        Ok(sqlx::query_as::<_, Role>(
            "SELECT r.* FROM roles r
             JOIN roles_rules l ON l.role_id = r.id
             WHERE l.rule_id = ?",
        )
        .bind(rule_id)
        .fetch_all(self.scope.conn())
        .await?)
    }
}
