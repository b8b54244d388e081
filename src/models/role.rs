//! Role entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A role grouping policies and rules. Roles with ids below
/// [`crate::MAX_ID_RESERVED`] are built-in and protected from deletion.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}
