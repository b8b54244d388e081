//! User entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A registered user. The `password` field always holds an argon2 digest,
/// never plaintext, and is skipped when serializing outward.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub allow_run_as: bool,
    pub created_at: DateTime<Utc>,
}
