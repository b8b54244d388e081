//! Rule entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A stored matching rule, e.g. `{"MATCH": {...}}`. The body is kept as JSON
/// text; it must be a JSON object, which the manager validates before write.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Rule {
    pub id: i64,
    pub name: String,
    pub rule: String,
    pub created_at: DateTime<Utc>,
}

impl Rule {
    /// Decode the stored body.
    pub fn body(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.rule)
    }
}
