//! Startup integrity check.
//!
//! Brings a logical database to the current schema version: a missing file is
//! created and seeded, an outdated one is moved aside, reseeded fresh and its
//! data migrated back.

use super::{DatabaseManager, ResourceType};
use crate::seed::DefaultDataset;
use crate::services::error::SecurityError;

/// Schema version stamped into `PRAGMA user_version` on every healthy
/// database.
pub const CURRENT_DB_VERSION: u32 = 1;

pub async fn check_database_integrity(
    manager: &mut DatabaseManager,
    name: &str,
    dataset: &DefaultDataset,
) -> Result<(), SecurityError> {
    let path = manager.database_path(name);
    if !path.exists() {
        tracing::info!(database = name, "database missing, creating");
        manager.connect(name).await?;
        manager.create_database(name).await?;
        manager.insert_data_from_yaml(name, dataset).await?;
        manager.set_database_version(name, CURRENT_DB_VERSION).await?;
        return Ok(());
    }

    manager.connect(name).await?;
    let version = manager.get_database_version(name).await?;
    if version >= CURRENT_DB_VERSION {
        tracing::debug!(database = name, version, "database up to date");
        return Ok(());
    }

    tracing::info!(
        database = name,
        from_version = version,
        to_version = CURRENT_DB_VERSION,
        "upgrading database"
    );
    let backup = format!("{name}.tmp");
    manager.disconnect(name).await?;
    std::fs::rename(&path, manager.database_path(&backup))?;

    manager.connect(&backup).await?;
    manager.connect(name).await?;
    manager.create_database(name).await?;
    manager.insert_data_from_yaml(name, dataset).await?;

    // Reserved range first so runtime resources remap onto the new defaults.
    manager
        .migrate_data(&backup, name, 1, Some(crate::MAX_ID_RESERVED - 1), ResourceType::Default)
        .await?;
    manager
        .migrate_data(&backup, name, crate::MAX_ID_RESERVED, None, ResourceType::User)
        .await?;

    manager.set_database_version(name, CURRENT_DB_VERSION).await?;
    manager.disconnect(&backup).await?;
    std::fs::remove_file(manager.database_path(&backup))?;
    tracing::info!(database = name, "upgrade finished");
    Ok(())
}
