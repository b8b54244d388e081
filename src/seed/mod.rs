//! Seed datasets.
//!
//! A dataset is a YAML document listing the built-in users, roles, rules and
//! policies plus the relationships wiring them together. Resources are keyed
//! by name; relationship lists reference those names, and ids are assigned in
//! document order starting at 1, so every seeded resource lands in the
//! reserved range. The stock dataset ships embedded in the binary; deployments
//! may load their own from disk.

use std::path::Path;

use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer};

use crate::models::PolicyBody;
use crate::services::error::SecurityError;

const DEFAULT_DATASET: &str = include_str!("default_dataset.yaml");

/// YAML mappings lose their document order through a `HashMap`; ids are
/// assigned positionally, so keep entries as an ordered list instead.
fn ordered_map<'de, D, T>(deserializer: D) -> Result<Vec<(String, T)>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let mapping = serde_yaml::Mapping::deserialize(deserializer)?;
    let mut entries = Vec::with_capacity(mapping.len());
    for (key, value) in mapping {
        let name = key
            .as_str()
            .ok_or_else(|| de::Error::custom("resource names must be strings"))?
            .to_string();
        let parsed = serde_yaml::from_value(value).map_err(de::Error::custom)?;
        entries.push((name, parsed));
    }
    Ok(entries)
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserSeed {
    pub password: String,
    #[serde(default)]
    pub allow_run_as: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuleSeed {
    pub rule: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PolicySeed {
    pub policy: PolicyBody,
}

/// Role names bound to one user, highest precedence first.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserLinks {
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Policy and rule names attached to one role, highest precedence first.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoleLinks {
    #[serde(default)]
    pub policies: Vec<String>,
    #[serde(default)]
    pub rules: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Relationships {
    #[serde(default, deserialize_with = "ordered_map")]
    pub users: Vec<(String, UserLinks)>,
    #[serde(default, deserialize_with = "ordered_map")]
    pub roles: Vec<(String, RoleLinks)>,
}

/// A full seed dataset, parsed but not yet persisted.
#[derive(Debug, Clone, Deserialize)]
pub struct DefaultDataset {
    #[serde(default, deserialize_with = "ordered_map")]
    pub users: Vec<(String, UserSeed)>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default, deserialize_with = "ordered_map")]
    pub rules: Vec<(String, RuleSeed)>,
    #[serde(default, deserialize_with = "ordered_map")]
    pub policies: Vec<(String, PolicySeed)>,
    #[serde(default)]
    pub relationships: Relationships,
}

impl DefaultDataset {
    /// The stock dataset compiled into the binary.
    pub fn embedded() -> Result<Self, SecurityError> {
        Self::from_yaml_str(DEFAULT_DATASET)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, SecurityError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SecurityError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_dataset_parses() {
        let dataset = DefaultDataset::embedded().unwrap();
        assert_eq!(dataset.users.len(), 2);
        assert_eq!(dataset.roles.len(), 4);
        assert_eq!(dataset.rules.len(), 2);
        assert_eq!(dataset.policies.len(), 5);
    }

    #[test]
    fn document_order_is_preserved() {
        let dataset = DefaultDataset::from_yaml_str(
            "policies:\n  zeta:\n    policy:\n      actions: [a]\n      resources: [r]\n      effect: allow\n  alpha:\n    policy:\n      actions: [b]\n      resources: [r]\n      effect: deny\n",
        )
        .unwrap();
        let names: Vec<&str> = dataset.policies.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["zeta", "alpha"]);
    }

    #[test]
    fn relationships_reference_declared_names() {
        let dataset = DefaultDataset::embedded().unwrap();
        for (_, links) in &dataset.relationships.users {
            for role in &links.roles {
                assert!(dataset.roles.contains(role), "unknown role {role}");
            }
        }
        for (role, links) in &dataset.relationships.roles {
            assert!(dataset.roles.contains(role), "unknown role {role}");
            for policy in &links.policies {
                assert!(
                    dataset.policies.iter().any(|(n, _)| n == policy),
                    "unknown policy {policy}"
                );
            }
            for rule in &links.rules {
                assert!(
                    dataset.rules.iter().any(|(n, _)| n == rule),
                    "unknown rule {rule}"
                );
            }
        }
    }

    #[test]
    fn non_boolean_run_as_is_rejected() {
        let err = DefaultDataset::from_yaml_str(
            "users:\n  probe:\n    password: secret\n    allow_run_as: sometimes\n",
        );
        assert!(err.is_err());
    }

    #[test]
    fn malformed_yaml_is_rejected() {
        assert!(DefaultDataset::from_yaml_str("users: [unclosed").is_err());
    }
}
