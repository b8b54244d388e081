//! Cross-database data migration.
//!
//! Copies a contiguous id range of resources from one database into another,
//! preserving ids where possible and remapping where the target already holds
//! an equivalent resource. Used by the integrity check to carry data across a
//! schema upgrade: the old file becomes the source and a freshly seeded file
//! the target.

use std::collections::HashMap;

use super::{DatabaseManager, SessionScope};
use crate::models::{Policy, Role, Rule, User};
use crate::services::error::SecurityError;
use crate::services::{
    links, AuthenticationManager, PoliciesManager, RolesManager, RolesPoliciesManager,
    RolesRulesManager, RulesManager, UserRolesManager,
};

/// How colliding resources are treated during a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    /// Runtime-created resources: collisions are remapped onto the matching
    /// target row and the source relationships are replayed.
    User,
    /// Reserved-range resources: the target's seeded copy is authoritative,
    /// only resources missing from the target are copied and relationships
    /// are left to the target's own seed.
    Default,
}

struct SourceSnapshot {
    users: Vec<User>,
    roles: Vec<Role>,
    policies: Vec<Policy>,
    rules: Vec<Rule>,
    user_roles: Vec<(i64, i64, i64)>,
    roles_policies: Vec<(i64, i64, i64)>,
    roles_rules: Vec<(i64, i64, i64)>,
}

impl DatabaseManager {
    /// Copy every resource with id in `[from_id, to_id]` (unbounded above
    /// when `to_id` is `None`) from `source` into `target`.
    ///
    /// Users, roles and rules collide by name; policies by body first, then
    /// name. A policy whose name and body match two different target rows is
    /// ambiguous and aborts the whole migration. Everything applied to the
    /// target happens in one transaction.
    pub async fn migrate_data(
        &self,
        source: &str,
        target: &str,
        from_id: i64,
        to_id: Option<i64>,
        resource_type: ResourceType,
    ) -> Result<(), SecurityError> {
        let snapshot = self.snapshot_source(source, from_id, to_id).await?;

        let session = self.session(target)?;
        let mut scope = SessionScope::begin(&session).await?;
        if let Err(err) = apply_snapshot(&mut scope, &snapshot, from_id, to_id, resource_type).await
        {
            scope.rollback().await?;
            return Err(err);
        }
        scope.commit().await?;
        tracing::info!(source, target, from_id, to_id, "migration applied");
        Ok(())
    }

    async fn snapshot_source(
        &self,
        source: &str,
        from_id: i64,
        to_id: Option<i64>,
    ) -> Result<SourceSnapshot, SecurityError> {
        let session = self.session(source)?;
        let mut scope = SessionScope::begin(&session).await?;
        let result = read_snapshot(&mut scope, from_id, to_id).await;
        // Read-only scope, nothing to keep either way.
        scope.rollback().await?;
        result
    }
}

async fn read_range<T>(
    scope: &mut SessionScope,
    table: &str,
    from_id: i64,
    to_id: Option<i64>,
) -> Result<Vec<T>, SecurityError>
where
    T: for<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> + Send + Unpin,
{
    let upper = to_id.unwrap_or(i64::MAX);
    Ok(sqlx::query_as::<_, T>(&format!(
        "SELECT * FROM {table} WHERE id >= ? AND id <= ? ORDER BY id"
    ))
    .bind(from_id)
    .bind(upper)
    .fetch_all(scope.conn())
    .await?)
}

async fn read_snapshot(
    scope: &mut SessionScope,
    from_id: i64,
    to_id: Option<i64>,
) -> Result<SourceSnapshot, SecurityError> {
    Ok(SourceSnapshot {
        users: read_range(scope, "users", from_id, to_id).await?,
        roles: read_range(scope, "roles", from_id, to_id).await?,
        policies: read_range(scope, "policies", from_id, to_id).await?,
        rules: read_range(scope, "rules", from_id, to_id).await?,
        user_roles: links::all_rows(scope.conn(), &links::USER_ROLES).await?,
        roles_policies: links::all_rows(scope.conn(), &links::ROLES_POLICIES).await?,
        roles_rules: links::all_rows(scope.conn(), &links::ROLES_RULES).await?,
    })
}

async fn id_occupied(
    scope: &mut SessionScope,
    table: &str,
    id: i64,
) -> Result<bool, SecurityError> {
    let found: Option<i64> = sqlx::query_scalar(&format!("SELECT id FROM {table} WHERE id = ?"))
        .bind(id)
        .fetch_optional(scope.conn())
        .await?;
    Ok(found.is_some())
}

/// Id to pin for a non-colliding resource: the source id when free in the
/// target, a fresh one otherwise.
async fn pin_or_fresh(
    scope: &mut SessionScope,
    table: &str,
    source_id: i64,
) -> Result<Option<i64>, SecurityError> {
    if id_occupied(scope, table, source_id).await? {
        Ok(None)
    } else {
        Ok(Some(source_id))
    }
}

async fn apply_snapshot(
    scope: &mut SessionScope,
    snapshot: &SourceSnapshot,
    from_id: i64,
    to_id: Option<i64>,
    resource_type: ResourceType,
) -> Result<(), SecurityError> {
    let mut user_map: HashMap<i64, i64> = HashMap::new();
    let mut role_map: HashMap<i64, i64> = HashMap::new();
    let mut policy_map: HashMap<i64, i64> = HashMap::new();
    let mut rule_map: HashMap<i64, i64> = HashMap::new();

    for user in &snapshot.users {
        let existing = {
            let mut manager = AuthenticationManager::new(scope);
            match manager.get_user(&user.username).await {
                Ok(found) => Some(found.id),
                Err(SecurityError::UserNotExist) => None,
                Err(err) => return Err(err),
            }
        };
        match existing {
            Some(target_id) => {
                user_map.insert(user.id, target_id);
            }
            None => {
                let pinned = pin_or_fresh(scope, "users", user.id).await?;
                let assigned = AuthenticationManager::new(scope)
                    .add_user_with_id(&user.username, &user.password, user.allow_run_as, pinned)
                    .await?;
                user_map.insert(user.id, assigned);
            }
        }
    }

    for role in &snapshot.roles {
        let existing = {
            let mut manager = RolesManager::new(scope);
            match manager.get_role(&role.name).await {
                Ok(found) => Some(found.id),
                Err(SecurityError::RoleNotExist) => None,
                Err(err) => return Err(err),
            }
        };
        match existing {
            Some(target_id) => {
                role_map.insert(role.id, target_id);
            }
            None => {
                let pinned = pin_or_fresh(scope, "roles", role.id).await?;
                let assigned = RolesManager::new(scope)
                    .add_role_with_id(&role.name, pinned)
                    .await?;
                role_map.insert(role.id, assigned);
            }
        }
    }

    for rule in &snapshot.rules {
        let existing = {
            let mut manager = RulesManager::new(scope);
            match manager.get_rule_by_name(&rule.name).await {
                Ok(found) => Some(found.id),
                Err(SecurityError::RuleNotExist) => None,
                Err(err) => return Err(err),
            }
        };
        match existing {
            Some(target_id) => {
                rule_map.insert(rule.id, target_id);
            }
            None => {
                let body = rule.body()?;
                let pinned = pin_or_fresh(scope, "rules", rule.id).await?;
                let assigned = RulesManager::new(scope)
                    .add_rule_with_id(&rule.name, &body, pinned)
                    .await?;
                rule_map.insert(rule.id, assigned);
            }
        }
    }

    for policy in &snapshot.policies {
        let (by_name, by_body) = {
            let mut manager = PoliciesManager::new(scope);
            let by_name = match manager.get_policy(&policy.name).await {
                Ok(found) => Some(found.id),
                Err(SecurityError::PolicyNotExist) => None,
                Err(err) => return Err(err),
            };
            let by_body = manager
                .get_policy_by_body(&policy.policy)
                .await?
                .map(|found| found.id);
            (by_name, by_body)
        };
        match (by_name, by_body) {
            (Some(name_id), Some(body_id)) if name_id != body_id => {
                return Err(SecurityError::Migration(format!(
                    "policy '{}' matches target policy {name_id} by name but {body_id} by body",
                    policy.name
                )));
            }
            (_, Some(body_id)) => {
                policy_map.insert(policy.id, body_id);
            }
            (Some(name_id), None) => {
                policy_map.insert(policy.id, name_id);
            }
            (None, None) => {
                let body = policy.body()?;
                let pinned = pin_or_fresh(scope, "policies", policy.id).await?;
                let assigned = PoliciesManager::new(scope)
                    .add_policy_with_id(&policy.name, &body, pinned)
                    .await?;
                policy_map.insert(policy.id, assigned);
            }
        }
    }

    // Reserved-range merges trust the target's own seed wiring.
    if resource_type == ResourceType::Default {
        return Ok(());
    }

    let in_range = |id: i64| id >= from_id && to_id.map_or(true, |upper| id <= upper);
    let mapped = |map: &HashMap<i64, i64>, id: i64| map.get(&id).copied().unwrap_or(id);

    for &(user_id, role_id, _level) in &snapshot.user_roles {
        if !in_range(user_id) && !in_range(role_id) {
            continue;
        }
        let outcome = UserRolesManager::new(scope)
            .add_role_to_user(mapped(&user_map, user_id), mapped(&role_map, role_id), None)
            .await;
        skip_missing_endpoint(outcome, "user role binding")?;
    }

    for &(role_id, policy_id, _level) in &snapshot.roles_policies {
        if !in_range(role_id) && !in_range(policy_id) {
            continue;
        }
        let outcome = RolesPoliciesManager::new(scope)
            .add_policy_to_role(mapped(&role_map, role_id), mapped(&policy_map, policy_id), None)
            .await;
        skip_missing_endpoint(outcome, "role policy link")?;
    }

    for &(role_id, rule_id, _level) in &snapshot.roles_rules {
        if !in_range(role_id) && !in_range(rule_id) {
            continue;
        }
        let outcome = RolesRulesManager::new(scope)
            .add_rule_to_role(mapped(&role_map, role_id), mapped(&rule_map, rule_id), None)
            .await;
        skip_missing_endpoint(outcome, "role rule link")?;
    }

    Ok(())
}

/// A relationship can reference an endpoint outside the migrated range that
/// no longer exists in the target; dropping the row is correct, anything else
/// still aborts.
fn skip_missing_endpoint(
    outcome: Result<bool, SecurityError>,
    what: &str,
) -> Result<(), SecurityError> {
    match outcome {
        Ok(_) => Ok(()),
        Err(
            SecurityError::UserNotExist
            | SecurityError::RoleNotExist
            | SecurityError::PolicyNotExist
            | SecurityError::RuleNotExist,
        ) => {
            tracing::warn!(what, "dropping relationship with missing endpoint");
            Ok(())
        }
        Err(err) => Err(err),
    }
}
