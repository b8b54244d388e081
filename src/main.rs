//! Maintenance binary: brings the security database up to the current schema
//! version, seeding or migrating as needed.

use anyhow::Context;

use rbac_store::config::Config;
use rbac_store::db::{check_database_integrity, DatabaseManager};
use rbac_store::observability::init_tracing;
use rbac_store::seed::DefaultDataset;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;
    init_tracing(&config.log_level);

    std::fs::create_dir_all(&config.databases_dir)
        .with_context(|| format!("failed to create {}", config.databases_dir.display()))?;

    let dataset = DefaultDataset::embedded().context("embedded dataset is invalid")?;
    let mut manager = DatabaseManager::new(&config.databases_dir);

    let outcome = check_database_integrity(&mut manager, &config.database_name, &dataset).await;
    manager.close_sessions().await;
    outcome.with_context(|| format!("integrity check failed for {}", config.database_name))?;

    tracing::info!(database = %config.database_name, "security database ready");
    Ok(())
}
