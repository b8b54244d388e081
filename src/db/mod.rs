//! Session management for the logical security databases.
//!
//! Each logical database (one sqlite file) gets exactly one connection,
//! owned by a [`Session`] and handed out under a mutex. A [`SessionScope`]
//! is the unit of work: it locks the session, opens a transaction and either
//! commits or rolls back as a whole. The managers in [`crate::services`] are
//! typed views over one scope, so an operation that spans several managers
//! (seeding, migration) still commits atomically.

mod integrity;
mod migrate;
mod seed_insert;

pub use integrity::{check_database_integrity, CURRENT_DB_VERSION};
pub use migrate::ResourceType;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::ConnectOptions;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::services::error::SecurityError;

/// Idempotent schema DDL, applied statement by statement.
const SCHEMA_DDL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        password TEXT NOT NULL,
        allow_run_as INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS roles (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS policies (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        policy TEXT NOT NULL UNIQUE,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS rules (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        rule TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS user_roles (
        user_id INTEGER NOT NULL,
        role_id INTEGER NOT NULL,
        level INTEGER NOT NULL,
        PRIMARY KEY (user_id, role_id)
    )",
    "CREATE TABLE IF NOT EXISTS roles_policies (
        role_id INTEGER NOT NULL,
        policy_id INTEGER NOT NULL,
        level INTEGER NOT NULL,
        PRIMARY KEY (role_id, policy_id)
    )",
    "CREATE TABLE IF NOT EXISTS roles_rules (
        role_id INTEGER NOT NULL,
        rule_id INTEGER NOT NULL,
        level INTEGER NOT NULL,
        PRIMARY KEY (role_id, rule_id)
    )",
    "CREATE TABLE IF NOT EXISTS token_rules (
        subject_kind TEXT NOT NULL,
        subject_id INTEGER NOT NULL,
        nbf INTEGER NOT NULL,
        PRIMARY KEY (subject_kind, subject_id)
    )",
];

#[derive(Debug)]
struct SessionInner {
    conn: SqliteConnection,
    in_txn: bool,
}

/// Shared handle to the single connection of one logical database.
#[derive(Clone, Debug)]
pub struct Session {
    inner: Arc<Mutex<SessionInner>>,
}

/// One transactional unit of work against one logical database.
///
/// `begin` takes the session lock and opens a transaction; `commit` or
/// `rollback` consume the scope. A scope dropped without either leaves the
/// transaction open on the connection; the next `begin` (or
/// [`DatabaseManager::rollback`]) discards that stale state first.
pub struct SessionScope {
    guard: OwnedMutexGuard<SessionInner>,
}

impl SessionScope {
    pub async fn begin(session: &Session) -> Result<Self, SecurityError> {
        let mut guard = session.inner.clone().lock_owned().await;
        if guard.in_txn {
            tracing::warn!("discarding uncommitted transaction left on session");
            sqlx::query("ROLLBACK").execute(&mut guard.conn).await?;
            guard.in_txn = false;
        }
        sqlx::query("BEGIN").execute(&mut guard.conn).await?;
        guard.in_txn = true;
        Ok(Self { guard })
    }

    pub async fn commit(mut self) -> Result<(), SecurityError> {
        sqlx::query("COMMIT").execute(&mut self.guard.conn).await?;
        self.guard.in_txn = false;
        Ok(())
    }

    pub async fn rollback(mut self) -> Result<(), SecurityError> {
        sqlx::query("ROLLBACK").execute(&mut self.guard.conn).await?;
        self.guard.in_txn = false;
        Ok(())
    }

    pub(crate) fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.guard.conn
    }
}

/// Owns the open sessions, one per logical database name.
///
/// This is an explicit instance passed to whoever needs it; there is no
/// process-global session registry.
pub struct DatabaseManager {
    databases_dir: PathBuf,
    sessions: HashMap<String, Session>,
}

impl DatabaseManager {
    pub fn new(databases_dir: impl AsRef<Path>) -> Self {
        Self {
            databases_dir: databases_dir.as_ref().to_path_buf(),
            sessions: HashMap::new(),
        }
    }

    /// Path of the sqlite file backing a logical database.
    pub fn database_path(&self, name: &str) -> PathBuf {
        self.databases_dir.join(name)
    }

    /// Open a session for `name`, or return the existing one.
    pub async fn connect(&mut self, name: &str) -> Result<Session, SecurityError> {
        if let Some(session) = self.sessions.get(name) {
            return Ok(session.clone());
        }

        let path = self.database_path(name);
        tracing::debug!(database = name, path = %path.display(), "opening session");
        let conn = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .connect()
            .await?;

        let session = Session {
            inner: Arc::new(Mutex::new(SessionInner {
                conn,
                in_txn: false,
            })),
        };
        self.sessions.insert(name.to_string(), session.clone());
        Ok(session)
    }

    /// Handle to an already connected session.
    pub fn session(&self, name: &str) -> Result<Session, SecurityError> {
        self.sessions
            .get(name)
            .cloned()
            .ok_or_else(|| SecurityError::SessionNotFound(name.to_string()))
    }

    /// Apply the schema DDL. Safe to call on an already created database.
    pub async fn create_database(&self, name: &str) -> Result<(), SecurityError> {
        let session = self.session(name)?;
        let mut guard = session.inner.lock().await;
        for statement in SCHEMA_DDL {
            sqlx::query(statement).execute(&mut guard.conn).await?;
        }
        tracing::debug!(database = name, "schema applied");
        Ok(())
    }

    /// Read the schema version marker (`PRAGMA user_version`, 0 when unset).
    pub async fn get_database_version(&self, name: &str) -> Result<u32, SecurityError> {
        let session = self.session(name)?;
        let mut guard = session.inner.lock().await;
        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&mut guard.conn)
            .await?;
        Ok(version as u32)
    }

    /// Write the schema version marker.
    pub async fn set_database_version(&self, name: &str, version: u32) -> Result<(), SecurityError> {
        let session = self.session(name)?;
        let mut guard = session.inner.lock().await;
        // PRAGMA does not accept bound parameters; version is a plain integer.
        sqlx::query(&format!("PRAGMA user_version = {version}"))
            .execute(&mut guard.conn)
            .await?;
        Ok(())
    }

    /// Discard any uncommitted transaction on one session. Other sessions are
    /// unaffected.
    pub async fn rollback(&self, name: &str) -> Result<(), SecurityError> {
        let session = self.session(name)?;
        let mut guard = session.inner.lock().await;
        if guard.in_txn {
            sqlx::query("ROLLBACK").execute(&mut guard.conn).await?;
            guard.in_txn = false;
            tracing::debug!(database = name, "rolled back uncommitted state");
        }
        Ok(())
    }

    /// Roll back uncommitted state on one session and drop it from the pool.
    pub async fn disconnect(&mut self, name: &str) -> Result<(), SecurityError> {
        self.rollback(name).await?;
        self.sessions.remove(name);
        Ok(())
    }

    /// Discard uncommitted state everywhere and release every session.
    pub async fn close_sessions(&mut self) {
        for (name, session) in self.sessions.drain() {
            let mut guard = session.inner.lock().await;
            if guard.in_txn {
                if let Err(err) = sqlx::query("ROLLBACK").execute(&mut guard.conn).await {
                    tracing::warn!(database = %name, error = %err, "rollback on close failed");
                }
                guard.in_txn = false;
            }
        }
    }
}
