//! Test helper module for rbac-store integration tests.
//!
//! Provides temp-dir-backed stores so every test runs against its own sqlite
//! files.

#![allow(dead_code)]

use rbac_store::db::{DatabaseManager, SessionScope};
use rbac_store::seed::DefaultDataset;
use tempfile::TempDir;

/// Name of the main logical database inside a test store.
pub const DB: &str = "rbac.db";

pub struct TestStore {
    pub manager: DatabaseManager,
    _dir: TempDir,
}

impl TestStore {
    /// Fresh store with the schema applied and no data.
    pub async fn spawn() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut manager = DatabaseManager::new(dir.path());
        manager.connect(DB).await.expect("Failed to connect");
        manager
            .create_database(DB)
            .await
            .expect("Failed to apply schema");
        TestStore {
            manager,
            _dir: dir,
        }
    }

    /// Fresh store seeded with the embedded default dataset.
    pub async fn spawn_seeded() -> Self {
        let store = Self::spawn().await;
        let dataset = DefaultDataset::embedded().expect("Failed to parse embedded dataset");
        store
            .manager
            .insert_data_from_yaml(DB, &dataset)
            .await
            .expect("Failed to seed");
        store
    }

    /// Open a transactional scope on the main database.
    pub async fn scope(&self) -> SessionScope {
        let session = self.manager.session(DB).expect("Session not connected");
        SessionScope::begin(&session)
            .await
            .expect("Failed to begin scope")
    }

    /// Connect and apply the schema to an additional logical database.
    pub async fn create_extra_database(&mut self, name: &str) {
        self.manager.connect(name).await.expect("Failed to connect");
        self.manager
            .create_database(name)
            .await
            .expect("Failed to apply schema");
    }

    /// Open a transactional scope on an additional logical database.
    pub async fn scope_on(&self, name: &str) -> SessionScope {
        let session = self.manager.session(name).expect("Session not connected");
        SessionScope::begin(&session)
            .await
            .expect("Failed to begin scope")
    }
}

/// A policy body helper for tests that only care about identity.
pub fn policy_body(action: &str, resource: &str) -> rbac_store::models::PolicyBody {
    rbac_store::models::PolicyBody {
        actions: vec![action.to_string()],
        resources: vec![resource.to_string()],
        effect: rbac_store::models::PolicyEffect::Allow,
    }
}

/// A minimal valid rule body.
pub fn rule_body(definition: &str) -> serde_json::Value {
    serde_json::json!({ "MATCH": { "definition": definition } })
}
