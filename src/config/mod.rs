use std::path::PathBuf;

use config::{Config as Cfg, File};
use serde::Deserialize;

use crate::services::error::SecurityError;

/// Runtime configuration, loaded from an optional `configuration` file plus
/// `RBAC__`-prefixed environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Directory holding the logical database files.
    #[serde(default = "default_databases_dir")]
    pub databases_dir: PathBuf,

    /// File name of the main security database inside `databases_dir`.
    #[serde(default = "default_database_name")]
    pub database_name: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Seconds after which a token-invalidation rule is considered expired:
    /// no credential issued before the rule can still be alive past this
    /// horizon, so the entry may be replaced or purged. Pass this value to
    /// [`crate::services::TokenManager::with_ttl`] when constructing the
    /// manager; `TokenManager::new` uses the same default as this field.
    #[serde(default = "default_token_rule_ttl_secs")]
    pub token_rule_ttl_secs: i64,
}

fn default_databases_dir() -> PathBuf {
    PathBuf::from("databases")
}

fn default_database_name() -> String {
    "rbac.db".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_token_rule_ttl_secs() -> i64 {
    900
}

impl Config {
    pub fn from_env() -> Result<Self, SecurityError> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("RBAC").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            databases_dir: default_databases_dir(),
            database_name: default_database_name(),
            log_level: default_log_level(),
            token_rule_ttl_secs: default_token_rule_ttl_secs(),
        }
    }
}
