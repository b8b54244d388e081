//! Session, transaction and seeding behavior of the database manager.

mod common;

use common::{TestStore, DB};
use rbac_store::db::{DatabaseManager, SessionScope};
use rbac_store::seed::DefaultDataset;
use rbac_store::services::{
    AuthenticationManager, PoliciesManager, RolesManager, RolesPoliciesManager, RulesManager,
    UserRolesManager,
};
use rbac_store::SecurityError;

#[tokio::test]
async fn unconnected_databases_have_no_session() {
    let store = TestStore::spawn().await;
    let err = store.manager.session("other.db").unwrap_err();
    assert!(matches!(err, SecurityError::SessionNotFound(name) if name == "other.db"));
}

#[tokio::test]
async fn connect_is_idempotent_per_name() {
    let mut store = TestStore::spawn().await;
    // Second connect reuses the session; writes through either handle land in
    // the same database.
    store.manager.connect(DB).await.unwrap();
    let mut scope = store.scope().await;
    AuthenticationManager::new(&mut scope)
        .add_user("newman", "pw")
        .await
        .unwrap();
    scope.commit().await.unwrap();

    let mut scope = store.scope().await;
    assert!(AuthenticationManager::new(&mut scope)
        .get_user("newman")
        .await
        .is_ok());
}

#[tokio::test]
async fn committed_work_persists_and_rolled_back_work_does_not() {
    let store = TestStore::spawn().await;

    let mut scope = store.scope().await;
    AuthenticationManager::new(&mut scope)
        .add_user("kept", "pw")
        .await
        .unwrap();
    scope.commit().await.unwrap();

    let mut scope = store.scope().await;
    AuthenticationManager::new(&mut scope)
        .add_user("discarded", "pw")
        .await
        .unwrap();
    scope.rollback().await.unwrap();

    let mut scope = store.scope().await;
    let mut users = AuthenticationManager::new(&mut scope);
    assert!(users.get_user("kept").await.is_ok());
    assert!(matches!(
        users.get_user("discarded").await.unwrap_err(),
        SecurityError::UserNotExist
    ));
}

#[tokio::test]
async fn a_dropped_scope_is_discarded_by_the_next_begin() {
    let store = TestStore::spawn().await;

    let mut scope = store.scope().await;
    AuthenticationManager::new(&mut scope)
        .add_user("orphan", "pw")
        .await
        .unwrap();
    drop(scope);

    let mut scope = store.scope().await;
    assert!(matches!(
        AuthenticationManager::new(&mut scope)
            .get_user("orphan")
            .await
            .unwrap_err(),
        SecurityError::UserNotExist
    ));
}

#[tokio::test]
async fn manager_rollback_targets_one_database_only() {
    let mut store = TestStore::spawn().await;
    store.create_extra_database("other.db").await;

    let mut scope = store.scope().await;
    AuthenticationManager::new(&mut scope)
        .add_user("main-user", "pw")
        .await
        .unwrap();
    // Leave the transaction open and discard it through the manager.
    drop(scope);

    let mut other_scope = store.scope_on("other.db").await;
    AuthenticationManager::new(&mut other_scope)
        .add_user("other-user", "pw")
        .await
        .unwrap();

    store.manager.rollback(DB).await.unwrap();

    // The other database's open transaction was untouched.
    other_scope.commit().await.unwrap();
    let mut other_scope = store.scope_on("other.db").await;
    assert!(AuthenticationManager::new(&mut other_scope)
        .get_user("other-user")
        .await
        .is_ok());

    let mut scope = store.scope().await;
    assert!(AuthenticationManager::new(&mut scope)
        .get_user("main-user")
        .await
        .is_err());
}

#[tokio::test]
async fn version_marker_round_trips() {
    let store = TestStore::spawn().await;
    assert_eq!(store.manager.get_database_version(DB).await.unwrap(), 0);
    store.manager.set_database_version(DB, 7).await.unwrap();
    assert_eq!(store.manager.get_database_version(DB).await.unwrap(), 7);
}

#[tokio::test]
async fn schema_creation_is_idempotent() {
    let store = TestStore::spawn().await;
    let mut scope = store.scope().await;
    AuthenticationManager::new(&mut scope)
        .add_user("newman", "pw")
        .await
        .unwrap();
    scope.commit().await.unwrap();

    // Re-applying the DDL must not clobber existing data.
    store.manager.create_database(DB).await.unwrap();
    let mut scope = store.scope().await;
    assert!(AuthenticationManager::new(&mut scope)
        .get_user("newman")
        .await
        .is_ok());
}

#[tokio::test]
async fn seeding_matches_the_dataset() {
    let store = TestStore::spawn_seeded().await;
    let dataset = DefaultDataset::embedded().unwrap();
    let mut scope = store.scope().await;

    let users = AuthenticationManager::new(&mut scope).get_users().await.unwrap();
    assert_eq!(users.len(), dataset.users.len());
    // Ids follow document order starting at 1, inside the reserved range.
    assert_eq!(users[0].id, 1);
    assert_eq!(users[0].username, dataset.users[0].0);
    assert!(users[0].allow_run_as);

    let roles = RolesManager::new(&mut scope).get_roles().await.unwrap();
    assert_eq!(roles.len(), dataset.roles.len());
    let policies = PoliciesManager::new(&mut scope).get_policies().await.unwrap();
    assert_eq!(policies.len(), dataset.policies.len());
    let rules = RulesManager::new(&mut scope).get_rules().await.unwrap();
    assert_eq!(rules.len(), dataset.rules.len());

    // The seeded admin credentials verify.
    assert!(AuthenticationManager::new(&mut scope)
        .check_user("admin", "admin")
        .await
        .unwrap());
}

#[tokio::test]
async fn seeding_wires_relationships_in_document_order() {
    let store = TestStore::spawn_seeded().await;
    let mut scope = store.scope().await;

    let admin = AuthenticationManager::new(&mut scope)
        .get_user("admin")
        .await
        .unwrap();
    let admin_roles = UserRolesManager::new(&mut scope)
        .get_all_roles_from_user(admin.id)
        .await
        .unwrap();
    assert_eq!(admin_roles.len(), 1);
    assert_eq!(admin_roles[0].name, "administrator");

    let readonly = RolesManager::new(&mut scope).get_role("readonly").await.unwrap();
    let readonly_policies = RolesPoliciesManager::new(&mut scope)
        .get_all_policies_from_role(readonly.id)
        .await
        .unwrap();
    let names: Vec<&str> = readonly_policies.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["agents_read", "security_read"]);
}

#[tokio::test]
async fn seeding_twice_fails_and_leaves_no_partial_state() {
    let store = TestStore::spawn_seeded().await;
    let dataset = DefaultDataset::embedded().unwrap();

    let err = store.manager.insert_data_from_yaml(DB, &dataset).await.unwrap_err();
    assert!(matches!(err, SecurityError::AlreadyExists));

    // Counts are unchanged; the failed run rolled back as a whole.
    let mut scope = store.scope().await;
    let users = AuthenticationManager::new(&mut scope).get_users().await.unwrap();
    assert_eq!(users.len(), dataset.users.len());
}

#[tokio::test]
async fn a_dataset_with_unknown_relationship_names_is_rejected() {
    let store = TestStore::spawn().await;
    let dataset = DefaultDataset::from_yaml_str(
        "roles:\n  - ops\nrelationships:\n  roles:\n    ghost:\n      policies: []\n",
    )
    .unwrap();

    let err = store.manager.insert_data_from_yaml(DB, &dataset).await.unwrap_err();
    assert!(matches!(err, SecurityError::Invalid(_)));

    // The declared role was rolled back along with the failure.
    let mut scope = store.scope().await;
    assert!(RolesManager::new(&mut scope).get_roles().await.unwrap().is_empty());
}

#[tokio::test]
async fn close_sessions_releases_everything() {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = DatabaseManager::new(dir.path());
    manager.connect(DB).await.unwrap();
    manager.create_database(DB).await.unwrap();
    manager.close_sessions().await;

    assert!(manager.session(DB).is_err());

    // Reconnecting picks the same file back up.
    manager.connect(DB).await.unwrap();
    let session = manager.session(DB).unwrap();
    let mut scope = SessionScope::begin(&session).await.unwrap();
    AuthenticationManager::new(&mut scope)
        .add_user("newman", "pw")
        .await
        .unwrap();
    scope.commit().await.unwrap();
}
