//! Policy entity and its structured body.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Whether a matching policy approves or denies the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyEffect {
    Allow,
    Deny,
}

/// Structured policy document: ordered actions, ordered resource patterns and
/// an effect. Serializing through this struct gives every body one canonical
/// JSON encoding (fixed field order), which is what the content-uniqueness
/// constraint compares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyBody {
    pub actions: Vec<String>,
    pub resources: Vec<String>,
    pub effect: PolicyEffect,
}

impl PolicyBody {
    /// Canonical JSON encoding of the body.
    pub fn canonical(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A stored policy. `policy` holds the canonical JSON body.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Policy {
    pub id: i64,
    pub name: String,
    pub policy: String,
    pub created_at: DateTime<Utc>,
}

impl Policy {
    /// Decode the stored body back into its structured form.
    pub fn body(&self) -> Result<PolicyBody, serde_json::Error> {
        serde_json::from_str(&self.policy)
    }
}
