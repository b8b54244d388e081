//! Seeding a database from a parsed dataset.

use std::collections::HashMap;

use super::{DatabaseManager, SessionScope};
use crate::seed::DefaultDataset;
use crate::services::error::SecurityError;
use crate::services::{
    AuthenticationManager, PoliciesManager, RolesManager, RolesPoliciesManager, RolesRulesManager,
    RulesManager, UserRolesManager,
};
use crate::utils::{hash_password, Password};

impl DatabaseManager {
    /// Insert every resource and relationship of `dataset` into the named
    /// database, in one transaction. Ids are pinned per table in document
    /// order starting at 1, keeping all seeded resources in the reserved
    /// range.
    pub async fn insert_data_from_yaml(
        &self,
        name: &str,
        dataset: &DefaultDataset,
    ) -> Result<(), SecurityError> {
        let session = self.session(name)?;
        let mut scope = SessionScope::begin(&session).await?;
        if let Err(err) = insert_dataset(&mut scope, dataset).await {
            scope.rollback().await?;
            return Err(err);
        }
        scope.commit().await?;
        tracing::info!(database = name, "dataset seeded");
        Ok(())
    }
}

async fn insert_dataset(
    scope: &mut SessionScope,
    dataset: &DefaultDataset,
) -> Result<(), SecurityError> {
    let mut user_ids: HashMap<&str, i64> = HashMap::new();
    let mut role_ids: HashMap<&str, i64> = HashMap::new();
    let mut policy_ids: HashMap<&str, i64> = HashMap::new();
    let mut rule_ids: HashMap<&str, i64> = HashMap::new();

    for (position, (username, seed)) in dataset.users.iter().enumerate() {
        let digest = hash_password(&Password::new(&seed.password))?;
        let id = AuthenticationManager::new(scope)
            .add_user_with_id(
                username,
                digest.as_str(),
                seed.allow_run_as,
                Some(position as i64 + 1),
            )
            .await?;
        user_ids.insert(username, id);
    }

    for (position, role_name) in dataset.roles.iter().enumerate() {
        let id = RolesManager::new(scope)
            .add_role_with_id(role_name, Some(position as i64 + 1))
            .await?;
        role_ids.insert(role_name, id);
    }

    for (position, (rule_name, seed)) in dataset.rules.iter().enumerate() {
        let id = RulesManager::new(scope)
            .add_rule_with_id(rule_name, &seed.rule, Some(position as i64 + 1))
            .await?;
        rule_ids.insert(rule_name, id);
    }

    for (position, (policy_name, seed)) in dataset.policies.iter().enumerate() {
        let id = PoliciesManager::new(scope)
            .add_policy_with_id(policy_name, &seed.policy, Some(position as i64 + 1))
            .await?;
        policy_ids.insert(policy_name, id);
    }

    let lookup = |ids: &HashMap<&str, i64>, name: &str, what: &str| {
        ids.get(name).copied().ok_or_else(|| {
            SecurityError::Invalid(format!("relationship references unknown {what} '{name}'"))
        })
    };

    for (username, links) in &dataset.relationships.users {
        let user_id = lookup(&user_ids, username, "user")?;
        for role_name in &links.roles {
            let role_id = lookup(&role_ids, role_name, "role")?;
            UserRolesManager::new(scope)
                .add_role_to_user(user_id, role_id, None)
                .await?;
        }
    }

    for (role_name, links) in &dataset.relationships.roles {
        let role_id = lookup(&role_ids, role_name, "role")?;
        for policy_name in &links.policies {
            let policy_id = lookup(&policy_ids, policy_name, "policy")?;
            RolesPoliciesManager::new(scope)
                .add_policy_to_role(role_id, policy_id, None)
                .await?;
        }
        for rule_name in &links.rules {
            let rule_id = lookup(&rule_ids, rule_name, "rule")?;
            RolesRulesManager::new(scope)
                .add_rule_to_role(role_id, rule_id, None)
                .await?;
        }
    }

    Ok(())
}
