//! Policy management.
//!
//! Policies carry two independent uniqueness constraints: the name, and the
//! canonical body. Colliding on the name of an existing policy is
//! `AlreadyExists`; submitting an existing body under a new name is
//! `Constraint`.

use chrono::Utc;

use crate::db::SessionScope;
use crate::models::{Policy, PolicyBody};
use crate::services::error::SecurityError;
use crate::services::{check_name, links, next_id};

pub struct PoliciesManager<'a> {
    scope: &'a mut SessionScope,
}

impl<'a> PoliciesManager<'a> {
    pub fn new(scope: &'a mut SessionScope) -> Self {
        Self { scope }
    }

    /// Create a policy, returning the assigned id.
    pub async fn add_policy(&mut self, name: &str, body: &PolicyBody) -> Result<i64, SecurityError> {
        self.add_policy_with_id(name, body, None).await
    }

    pub(crate) async fn add_policy_with_id(
        &mut self,
        name: &str,
        body: &PolicyBody,
        id: Option<i64>,
    ) -> Result<i64, SecurityError> {
        check_name(name)?;
        let canonical = body.canonical()?;

        if self.get_policy(name).await.is_ok() {
            return Err(SecurityError::AlreadyExists);
        }
        if self.get_policy_by_body(&canonical).await?.is_some() {
            return Err(SecurityError::Constraint(
                "policy body already exists under another name".to_string(),
            ));
        }

        let id = match id {
            Some(id) => id,
            None => next_id(self.scope.conn(), "policies").await?,
        };
        sqlx::query("INSERT INTO policies (id, name, policy, created_at) VALUES (?, ?, ?, ?)")
            .bind(id)
            .bind(name)
            .bind(&canonical)
            .bind(Utc::now())
            .execute(self.scope.conn())
            .await?;

        tracing::debug!(policy = name, id, "policy added");
        Ok(id)
    }

    pub async fn get_policy(&mut self, name: &str) -> Result<Policy, SecurityError> {
        sqlx::query_as::<_, Policy>("SELECT * FROM policies WHERE name = ?")
            .bind(name)
            .fetch_optional(self.scope.conn())
            .await?
            .ok_or(SecurityError::PolicyNotExist)
    }

    pub async fn get_policy_id(&mut self, policy_id: i64) -> Result<Policy, SecurityError> {
        sqlx::query_as::<_, Policy>("SELECT * FROM policies WHERE id = ?")
            .bind(policy_id)
            .fetch_optional(self.scope.conn())
            .await?
            .ok_or(SecurityError::PolicyNotExist)
    }

    /// Look a policy up by its canonical body encoding.
    pub(crate) async fn get_policy_by_body(
        &mut self,
        canonical: &str,
    ) -> Result<Option<Policy>, SecurityError> {
        Ok(
            sqlx::query_as::<_, Policy>("SELECT * FROM policies WHERE policy = ?")
                .bind(canonical)
                .fetch_optional(self.scope.conn())
                .await?,
        )
    }

    /// All policies in insertion (id) order.
    pub async fn get_policies(&mut self) -> Result<Vec<Policy>, SecurityError> {
        Ok(
            sqlx::query_as::<_, Policy>("SELECT * FROM policies ORDER BY id")
                .fetch_all(self.scope.conn())
                .await?,
        )
    }

    /// Rewrite a policy's name and body. Built-ins are protected; `Ok(false)`
    /// no-op when the id does not exist.
    pub async fn update_policy(
        &mut self,
        policy_id: i64,
        name: &str,
        body: &PolicyBody,
    ) -> Result<bool, SecurityError> {
        if policy_id < crate::MAX_ID_RESERVED {
            return Err(SecurityError::ProtectedResource(policy_id));
        }
        check_name(name)?;
        let canonical = body.canonical()?;

        if let Ok(existing) = self.get_policy(name).await {
            if existing.id != policy_id {
                return Err(SecurityError::AlreadyExists);
            }
        }
        if let Some(existing) = self.get_policy_by_body(&canonical).await? {
            if existing.id != policy_id {
                return Err(SecurityError::Constraint(
                    "policy body already exists under another name".to_string(),
                ));
            }
        }

        let done = sqlx::query("UPDATE policies SET name = ?, policy = ? WHERE id = ?")
            .bind(name)
            .bind(&canonical)
            .bind(policy_id)
            .execute(self.scope.conn())
            .await?;
        Ok(done.rows_affected() > 0)
    }

    /// Delete a policy and its role links. Built-ins are protected.
    pub async fn delete_policy(&mut self, policy_id: i64) -> Result<bool, SecurityError> {
        if policy_id < crate::MAX_ID_RESERVED {
            return Err(SecurityError::ProtectedResource(policy_id));
        }

        let done = sqlx::query("DELETE FROM policies WHERE id = ?")
            .bind(policy_id)
            .execute(self.scope.conn())
            .await?;
        if done.rows_affected() == 0 {
            return Ok(false);
        }

        links::remove_all_for_object(self.scope.conn(), &links::ROLES_POLICIES, policy_id).await?;
        tracing::debug!(id = policy_id, "policy deleted");
        Ok(true)
    }

    pub async fn delete_policy_by_name(&mut self, name: &str) -> Result<bool, SecurityError> {
        let policy = self.get_policy(name).await?;
        self.delete_policy(policy.id).await
    }

    /// Remove every non-built-in policy. Returns how many were deleted.
    pub async fn delete_all_policies(&mut self) -> Result<u64, SecurityError> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM policies WHERE id >= ? ORDER BY id")
            .bind(crate::MAX_ID_RESERVED)
            .fetch_all(self.scope.conn())
            .await?;
        let mut removed = 0;
        for id in ids {
            if self.delete_policy(id).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
