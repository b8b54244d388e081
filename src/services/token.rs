//! Token invalidation ledger.
//!
//! A ledger entry for a user or role means: credentials for that subject
//! issued at or before `nbf` are dead. Entries themselves age out. Once an
//! entry is older than the token TTL, no live credential can predate it, so
//! it may be replaced or purged.

use std::collections::HashMap;

use chrono::Utc;

use crate::db::SessionScope;
use crate::models::{SubjectKind, TokenRule, TokenSubject};
use crate::services::error::SecurityError;
use crate::services::{ensure_role, ensure_user};

/// Default horizon after which a ledger entry is expired, matching the
/// default credential lifetime.
pub const DEFAULT_TOKEN_RULE_TTL_SECS: i64 = 900;

pub struct TokenManager<'a> {
    scope: &'a mut SessionScope,
    ttl_secs: i64,
}

impl<'a> TokenManager<'a> {
    pub fn new(scope: &'a mut SessionScope) -> Self {
        Self::with_ttl(scope, DEFAULT_TOKEN_RULE_TTL_SECS)
    }

    pub fn with_ttl(scope: &'a mut SessionScope, ttl_secs: i64) -> Self {
        Self { scope, ttl_secs }
    }

    async fn rule_for(
        &mut self,
        kind: SubjectKind,
        subject_id: i64,
    ) -> Result<Option<TokenRule>, SecurityError> {
        Ok(sqlx::query_as::<_, TokenRule>(
            "SELECT subject_kind, subject_id, nbf FROM token_rules
             WHERE subject_kind = ? AND subject_id = ?",
        )
        .bind(kind)
        .bind(subject_id)
        .fetch_optional(self.scope.conn())
        .await?)
    }

    async fn upsert(&mut self, kind: SubjectKind, subject_id: i64, nbf: i64) -> Result<(), SecurityError> {
        sqlx::query(
            "INSERT INTO token_rules (subject_kind, subject_id, nbf) VALUES (?, ?, ?)
             ON CONFLICT (subject_kind, subject_id) DO UPDATE SET nbf = excluded.nbf",
        )
        .bind(kind)
        .bind(subject_id)
        .bind(nbf)
        .execute(self.scope.conn())
        .await?;
        Ok(())
    }

    /// Invalidate every credential issued so far for the given users and
    /// roles by recording `nbf = now` for each.
    ///
    /// An id that already carries an unexpired entry is rejected with
    /// `AlreadyExists` before anything is written: its credentials are
    /// already dead and moving the timestamp forward would only extend the
    /// ledger's lifetime. Expired entries are silently replaced.
    pub async fn add_user_roles_rules(
        &mut self,
        users: &[i64],
        roles: &[i64],
    ) -> Result<(), SecurityError> {
        for user_id in users {
            ensure_user(self.scope.conn(), *user_id).await?;
        }
        for role_id in roles {
            ensure_role(self.scope.conn(), *role_id).await?;
        }

        let now = Utc::now().timestamp();
        for user_id in users {
            if let Some(rule) = self.rule_for(SubjectKind::User, *user_id).await? {
                if rule.nbf + self.ttl_secs > now {
                    return Err(SecurityError::AlreadyExists);
                }
            }
        }
        for role_id in roles {
            if let Some(rule) = self.rule_for(SubjectKind::Role, *role_id).await? {
                if rule.nbf + self.ttl_secs > now {
                    return Err(SecurityError::AlreadyExists);
                }
            }
        }

        for user_id in users {
            self.upsert(SubjectKind::User, *user_id, now).await?;
        }
        for role_id in roles {
            self.upsert(SubjectKind::Role, *role_id, now).await?;
        }
        tracing::debug!(users = users.len(), roles = roles.len(), "token rules recorded");
        Ok(())
    }

    /// Whether a credential issued at `token_nbf` is still acceptable for the
    /// subject. True when no ledger entry exists or the entry predates the
    /// credential.
    pub async fn is_token_valid(
        &mut self,
        subject: TokenSubject,
        token_nbf: i64,
    ) -> Result<bool, SecurityError> {
        match self.rule_for(subject.kind(), subject.id()).await? {
            Some(rule) => Ok(token_nbf > rule.nbf),
            None => Ok(true),
        }
    }

    /// Current ledger contents as (user id → nbf, role id → nbf) maps.
    pub async fn get_all_rules(
        &mut self,
    ) -> Result<(HashMap<i64, i64>, HashMap<i64, i64>), SecurityError> {
        let rows = sqlx::query_as::<_, TokenRule>(
            "SELECT subject_kind, subject_id, nbf FROM token_rules",
        )
        .fetch_all(self.scope.conn())
        .await?;

        let mut users = HashMap::new();
        let mut roles = HashMap::new();
        for rule in rows {
            match rule.subject_kind {
                SubjectKind::User => users.insert(rule.subject_id, rule.nbf),
                SubjectKind::Role => roles.insert(rule.subject_id, rule.nbf),
            };
        }
        Ok((users, roles))
    }

    /// Clear the whole ledger. Returns the number of entries removed.
    pub async fn delete_all_rules(&mut self) -> Result<u64, SecurityError> {
        let done = sqlx::query("DELETE FROM token_rules")
            .execute(self.scope.conn())
            .await?;
        Ok(done.rows_affected())
    }

    /// Drop entries no live credential can predate any more. Returns the
    /// affected (user ids, role ids) so callers can refresh their own
    /// bookkeeping.
    pub async fn delete_all_expired_rules(&mut self) -> Result<(Vec<i64>, Vec<i64>), SecurityError> {
        let horizon = Utc::now().timestamp() - self.ttl_secs;
        let expired = sqlx::query_as::<_, TokenRule>(
            "SELECT subject_kind, subject_id, nbf FROM token_rules WHERE nbf <= ?",
        )
        .bind(horizon)
        .fetch_all(self.scope.conn())
        .await?;

        sqlx::query("DELETE FROM token_rules WHERE nbf <= ?")
            .bind(horizon)
            .execute(self.scope.conn())
            .await?;

        let mut users = Vec::new();
        let mut roles = Vec::new();
        for rule in expired {
            match rule.subject_kind {
                SubjectKind::User => users.push(rule.subject_id),
                SubjectKind::Role => roles.push(rule.subject_id),
            }
        }
        Ok((users, roles))
    }
}
