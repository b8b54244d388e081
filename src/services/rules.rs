//! Rule management.

use chrono::Utc;

use crate::db::SessionScope;
use crate::models::Rule;
use crate::services::error::SecurityError;
use crate::services::{check_name, links, next_id};

/// A rule body must be a JSON object such as `{"MATCH": {...}}`.
fn check_rule_body(body: &serde_json::Value) -> Result<(), SecurityError> {
    if !body.is_object() {
        return Err(SecurityError::Invalid(
            "rule body must be a JSON object".to_string(),
        ));
    }
    Ok(())
}

pub struct RulesManager<'a> {
    scope: &'a mut SessionScope,
}

impl<'a> RulesManager<'a> {
    pub fn new(scope: &'a mut SessionScope) -> Self {
        Self { scope }
    }

    /// Create a rule, returning the assigned id.
    pub async fn add_rule(
        &mut self,
        name: &str,
        body: &serde_json::Value,
    ) -> Result<i64, SecurityError> {
        self.add_rule_with_id(name, body, None).await
    }

    pub(crate) async fn add_rule_with_id(
        &mut self,
        name: &str,
        body: &serde_json::Value,
        id: Option<i64>,
    ) -> Result<i64, SecurityError> {
        check_name(name)?;
        check_rule_body(body)?;
        if self.get_rule_by_name(name).await.is_ok() {
            return Err(SecurityError::AlreadyExists);
        }

        let id = match id {
            Some(id) => id,
            None => next_id(self.scope.conn(), "rules").await?,
        };
        sqlx::query("INSERT INTO rules (id, name, rule, created_at) VALUES (?, ?, ?, ?)")
            .bind(id)
            .bind(name)
            .bind(serde_json::to_string(body)?)
            .bind(Utc::now())
            .execute(self.scope.conn())
            .await?;

        tracing::debug!(rule = name, id, "rule added");
        Ok(id)
    }

    pub async fn get_rule(&mut self, rule_id: i64) -> Result<Rule, SecurityError> {
        sqlx::query_as::<_, Rule>("SELECT * FROM rules WHERE id = ?")
            .bind(rule_id)
            .fetch_optional(self.scope.conn())
            .await?
            .ok_or(SecurityError::RuleNotExist)
    }

    pub async fn get_rule_by_name(&mut self, name: &str) -> Result<Rule, SecurityError> {
        sqlx::query_as::<_, Rule>("SELECT * FROM rules WHERE name = ?")
            .bind(name)
            .fetch_optional(self.scope.conn())
            .await?
            .ok_or(SecurityError::RuleNotExist)
    }

    /// All rules in insertion (id) order.
    pub async fn get_rules(&mut self) -> Result<Vec<Rule>, SecurityError> {
        Ok(sqlx::query_as::<_, Rule>("SELECT * FROM rules ORDER BY id")
            .fetch_all(self.scope.conn())
            .await?)
    }

    /// Rewrite a rule's name and body. Built-ins are protected; `Ok(false)`
    /// no-op when the id does not exist.
    pub async fn update_rule(
        &mut self,
        rule_id: i64,
        name: &str,
        body: &serde_json::Value,
    ) -> Result<bool, SecurityError> {
        if rule_id < crate::MAX_ID_RESERVED {
            return Err(SecurityError::ProtectedResource(rule_id));
        }
        check_name(name)?;
        check_rule_body(body)?;
        if let Ok(existing) = self.get_rule_by_name(name).await {
            if existing.id != rule_id {
                return Err(SecurityError::AlreadyExists);
            }
        }

        let done = sqlx::query("UPDATE rules SET name = ?, rule = ? WHERE id = ?")
            .bind(name)
            .bind(serde_json::to_string(body)?)
            .bind(rule_id)
            .execute(self.scope.conn())
            .await?;
        Ok(done.rows_affected() > 0)
    }

    /// Delete a rule and its role links. Built-ins are protected.
    pub async fn delete_rule(&mut self, rule_id: i64) -> Result<bool, SecurityError> {
        if rule_id < crate::MAX_ID_RESERVED {
            return Err(SecurityError::ProtectedResource(rule_id));
        }

        let done = sqlx::query("DELETE FROM rules WHERE id = ?")
            .bind(rule_id)
            .execute(self.scope.conn())
            .await?;
        if done.rows_affected() == 0 {
            return Ok(false);
        }

        links::remove_all_for_object(self.scope.conn(), &links::ROLES_RULES, rule_id).await?;
        tracing::debug!(id = rule_id, "rule deleted");
        Ok(true)
    }

    pub async fn delete_rule_by_name(&mut self, name: &str) -> Result<bool, SecurityError> {
        let rule = self.get_rule_by_name(name).await?;
        self.delete_rule(rule.id).await
    }

    /// Remove every non-built-in rule. Returns how many were deleted.
    pub async fn delete_all_rules(&mut self) -> Result<u64, SecurityError> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM rules WHERE id >= ? ORDER BY id")
            .bind(crate::MAX_ID_RESERVED)
            .fetch_all(self.scope.conn())
            .await?;
        let mut removed = 0;
        for id in ids {
            if self.delete_rule(id).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
