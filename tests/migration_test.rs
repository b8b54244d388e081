//! Migration and startup integrity behavior.

mod common;

use common::{policy_body, TestStore, DB};
use rbac_store::db::{
    check_database_integrity, DatabaseManager, ResourceType, CURRENT_DB_VERSION,
};
use rbac_store::seed::DefaultDataset;
use rbac_store::services::{
    AuthenticationManager, PoliciesManager, RolesManager, RolesPoliciesManager, UserRolesManager,
};
use rbac_store::{SecurityError, MAX_ID_RESERVED};

const SOURCE: &str = "source.db";

/// Seeded target plus an empty source database on the same store.
async fn spawn_pair() -> TestStore {
    let mut store = TestStore::spawn_seeded().await;
    store.create_extra_database(SOURCE).await;
    store
}

#[tokio::test]
async fn migrated_resources_keep_their_ids_and_relationships() {
    let store = spawn_pair().await;

    let mut scope = store.scope_on(SOURCE).await;
    let user = AuthenticationManager::new(&mut scope)
        .add_user("newman", "pw")
        .await
        .unwrap();
    let role = RolesManager::new(&mut scope).add_role("ops").await.unwrap();
    let policy = PoliciesManager::new(&mut scope)
        .add_policy("custom", &policy_body("widgets:read", "widget:id:*"))
        .await
        .unwrap();
    UserRolesManager::new(&mut scope)
        .add_role_to_user(user, role, None)
        .await
        .unwrap();
    RolesPoliciesManager::new(&mut scope)
        .add_policy_to_role(role, policy, None)
        .await
        .unwrap();
    scope.commit().await.unwrap();

    store
        .manager
        .migrate_data(SOURCE, DB, MAX_ID_RESERVED, None, ResourceType::User)
        .await
        .unwrap();

    let mut scope = store.scope().await;
    assert_eq!(
        AuthenticationManager::new(&mut scope)
            .get_user("newman")
            .await
            .unwrap()
            .id,
        user
    );
    assert_eq!(RolesManager::new(&mut scope).get_role("ops").await.unwrap().id, role);
    let roles_of_user = UserRolesManager::new(&mut scope)
        .get_all_roles_from_user(user)
        .await
        .unwrap();
    assert_eq!(roles_of_user.len(), 1);
    assert_eq!(roles_of_user[0].id, role);
    let policies_of_role = RolesPoliciesManager::new(&mut scope)
        .get_all_policies_from_role(role)
        .await
        .unwrap();
    assert_eq!(policies_of_role.len(), 1);
    assert_eq!(policies_of_role[0].id, policy);
}

#[tokio::test]
async fn a_policy_colliding_by_body_is_remapped_onto_the_target_copy() {
    let store = spawn_pair().await;
    let dataset = DefaultDataset::embedded().unwrap();

    // The body of a target default, under a different name in the source.
    let default_body = dataset.policies[0].1.policy.clone();
    let default_name = dataset.policies[0].0.clone();

    let mut scope = store.scope_on(SOURCE).await;
    let role = RolesManager::new(&mut scope).add_role("ops").await.unwrap();
    let clone_id = PoliciesManager::new(&mut scope)
        .add_policy("cloned-default", &default_body)
        .await
        .unwrap();
    RolesPoliciesManager::new(&mut scope)
        .add_policy_to_role(role, clone_id, None)
        .await
        .unwrap();
    scope.commit().await.unwrap();

    store
        .manager
        .migrate_data(SOURCE, DB, MAX_ID_RESERVED, None, ResourceType::User)
        .await
        .unwrap();

    let mut scope = store.scope().await;
    let mut policies = PoliciesManager::new(&mut scope);
    // Policy count unchanged: the colliding body was not copied.
    assert_eq!(policies.get_policies().await.unwrap().len(), dataset.policies.len());
    assert!(matches!(
        policies.get_policy("cloned-default").await.unwrap_err(),
        SecurityError::PolicyNotExist
    ));
    let target_default = policies.get_policy(&default_name).await.unwrap();

    // The role's link was remapped onto the target's own copy.
    let linked = RolesPoliciesManager::new(&mut scope)
        .get_all_policies_from_role(role)
        .await
        .unwrap();
    assert_eq!(linked.len(), 1);
    assert_eq!(linked[0].id, target_default.id);
}

#[tokio::test]
async fn an_ambiguous_policy_aborts_the_whole_migration() {
    let store = spawn_pair().await;
    let dataset = DefaultDataset::embedded().unwrap();

    // Name of one target default, body of a different one.
    let name_of_first = dataset.policies[0].0.clone();
    let body_of_second = dataset.policies[1].1.policy.clone();

    let mut scope = store.scope_on(SOURCE).await;
    RolesManager::new(&mut scope).add_role("ops").await.unwrap();
    PoliciesManager::new(&mut scope)
        .add_policy(&name_of_first, &body_of_second)
        .await
        .unwrap();
    scope.commit().await.unwrap();

    let err = store
        .manager
        .migrate_data(SOURCE, DB, MAX_ID_RESERVED, None, ResourceType::User)
        .await
        .unwrap_err();
    assert!(matches!(err, SecurityError::Migration(_)));

    // Nothing from the aborted run persisted, including the unrelated role.
    let mut scope = store.scope().await;
    assert!(matches!(
        RolesManager::new(&mut scope).get_role("ops").await.unwrap_err(),
        SecurityError::RoleNotExist
    ));
}

#[tokio::test]
async fn default_migration_copies_missing_resources_without_relationships() {
    let store = spawn_pair().await;
    let dataset = DefaultDataset::embedded().unwrap();

    // A source built-in range holding one role the target lacks and one it
    // already has, plus wiring that must not be replayed.
    let old_defaults = DefaultDataset::from_yaml_str(
        "roles:\n  - retired_builtin\n  - administrator\npolicies:\n  retired_policy:\n    policy:\n      actions: [\"x:read\"]\n      resources: [\"x:*\"]\n      effect: allow\nrelationships:\n  roles:\n    retired_builtin:\n      policies: [retired_policy]\n",
    )
    .unwrap();
    store
        .manager
        .insert_data_from_yaml(SOURCE, &old_defaults)
        .await
        .unwrap();

    store
        .manager
        .migrate_data(SOURCE, DB, 1, Some(MAX_ID_RESERVED - 1), ResourceType::Default)
        .await
        .unwrap();

    let mut scope = store.scope().await;
    // The missing resources were copied; the colliding role was skipped with
    // the target's copy authoritative.
    let retired = RolesManager::new(&mut scope)
        .get_role("retired_builtin")
        .await
        .unwrap();
    assert_eq!(
        RolesManager::new(&mut scope).get_roles().await.unwrap().len(),
        dataset.roles.len() + 1
    );
    assert_eq!(
        PoliciesManager::new(&mut scope).get_policies().await.unwrap().len(),
        dataset.policies.len() + 1
    );
    // No relationships were replayed for the default range.
    assert!(RolesPoliciesManager::new(&mut scope)
        .get_all_policies_from_role(retired.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn occupied_target_ids_fall_back_to_fresh_ones() {
    let store = spawn_pair().await;

    // Target already holds a runtime role at the id the source role carries.
    let mut scope = store.scope().await;
    let blocker = RolesManager::new(&mut scope).add_role("blocker").await.unwrap();
    scope.commit().await.unwrap();

    let mut scope = store.scope_on(SOURCE).await;
    let source_role = RolesManager::new(&mut scope).add_role("incoming").await.unwrap();
    scope.commit().await.unwrap();
    assert_eq!(blocker, source_role);

    store
        .manager
        .migrate_data(SOURCE, DB, MAX_ID_RESERVED, None, ResourceType::User)
        .await
        .unwrap();

    let mut scope = store.scope().await;
    let incoming = RolesManager::new(&mut scope).get_role("incoming").await.unwrap();
    assert_ne!(incoming.id, blocker);
}

#[tokio::test]
async fn integrity_check_creates_and_seeds_a_missing_database() {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = DatabaseManager::new(dir.path());
    let dataset = DefaultDataset::embedded().unwrap();

    check_database_integrity(&mut manager, DB, &dataset)
        .await
        .unwrap();

    assert!(dir.path().join(DB).exists());
    assert_eq!(
        manager.get_database_version(DB).await.unwrap(),
        CURRENT_DB_VERSION
    );
    let session = manager.session(DB).unwrap();
    let mut scope = rbac_store::db::SessionScope::begin(&session).await.unwrap();
    let users = AuthenticationManager::new(&mut scope).get_users().await.unwrap();
    assert_eq!(users.len(), dataset.users.len());
}

#[tokio::test]
async fn integrity_check_is_a_noop_on_a_current_database() {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = DatabaseManager::new(dir.path());
    let dataset = DefaultDataset::embedded().unwrap();

    check_database_integrity(&mut manager, DB, &dataset).await.unwrap();

    // Add runtime state and run the check again.
    let session = manager.session(DB).unwrap();
    let mut scope = rbac_store::db::SessionScope::begin(&session).await.unwrap();
    AuthenticationManager::new(&mut scope).add_user("newman", "pw").await.unwrap();
    scope.commit().await.unwrap();

    check_database_integrity(&mut manager, DB, &dataset).await.unwrap();

    let session = manager.session(DB).unwrap();
    let mut scope = rbac_store::db::SessionScope::begin(&session).await.unwrap();
    assert!(AuthenticationManager::new(&mut scope).get_user("newman").await.is_ok());
}

#[tokio::test]
async fn integrity_check_upgrades_an_outdated_database() {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = DatabaseManager::new(dir.path());
    let dataset = DefaultDataset::embedded().unwrap();

    check_database_integrity(&mut manager, DB, &dataset).await.unwrap();

    // Runtime state that must survive the upgrade.
    let session = manager.session(DB).unwrap();
    let mut scope = rbac_store::db::SessionScope::begin(&session).await.unwrap();
    let user = AuthenticationManager::new(&mut scope)
        .add_user("newman", "pw")
        .await
        .unwrap();
    let role = RolesManager::new(&mut scope).add_role("ops").await.unwrap();
    UserRolesManager::new(&mut scope)
        .add_role_to_user(user, role, None)
        .await
        .unwrap();
    scope.commit().await.unwrap();

    // Make the database look like it came from an older release.
    manager.set_database_version(DB, 0).await.unwrap();
    manager.close_sessions().await;

    check_database_integrity(&mut manager, DB, &dataset).await.unwrap();

    assert_eq!(
        manager.get_database_version(DB).await.unwrap(),
        CURRENT_DB_VERSION
    );
    // The working copy was cleaned up.
    assert!(!dir.path().join(format!("{DB}.tmp")).exists());

    let session = manager.session(DB).unwrap();
    let mut scope = rbac_store::db::SessionScope::begin(&session).await.unwrap();
    let migrated = AuthenticationManager::new(&mut scope).get_user("newman").await.unwrap();
    assert_eq!(migrated.id, user);
    let roles = UserRolesManager::new(&mut scope)
        .get_all_roles_from_user(user)
        .await
        .unwrap();
    assert_eq!(roles.len(), 1);
    assert_eq!(roles[0].name, "ops");
    // Defaults were reseeded, not duplicated.
    let users = AuthenticationManager::new(&mut scope).get_users().await.unwrap();
    assert_eq!(users.len(), dataset.users.len() + 1);
}
