//! Ordered many-to-many link storage.
//!
//! Each link table carries an integer `level` column that is kept a dense
//! zero-based sequence per subject: inserting at a position shifts later rows
//! up, removing closes the gap. All renumbering happens inside the caller's
//! transaction, so a half-shifted ordering is never observable.

use sqlx::sqlite::SqliteConnection;

use crate::services::error::SecurityError;

/// Static description of one link table. Identifiers are compile-time
/// constants, never user input.
pub(crate) struct LinkTable {
    pub table: &'static str,
    pub subject: &'static str,
    pub object: &'static str,
}

pub(crate) const USER_ROLES: LinkTable = LinkTable {
    table: "user_roles",
    subject: "user_id",
    object: "role_id",
};

pub(crate) const ROLES_POLICIES: LinkTable = LinkTable {
    table: "roles_policies",
    subject: "role_id",
    object: "policy_id",
};

pub(crate) const ROLES_RULES: LinkTable = LinkTable {
    table: "roles_rules",
    subject: "role_id",
    object: "rule_id",
};

pub(crate) async fn exists(
    conn: &mut SqliteConnection,
    t: &LinkTable,
    subject_id: i64,
    object_id: i64,
) -> Result<bool, SecurityError> {
    let found: Option<i64> = sqlx::query_scalar(&format!(
        "SELECT level FROM {} WHERE {} = ? AND {} = ?",
        t.table, t.subject, t.object
    ))
    .bind(subject_id)
    .bind(object_id)
    .fetch_optional(conn)
    .await?;
    Ok(found.is_some())
}

async fn level_of(
    conn: &mut SqliteConnection,
    t: &LinkTable,
    subject_id: i64,
    object_id: i64,
) -> Result<Option<i64>, SecurityError> {
    Ok(sqlx::query_scalar(&format!(
        "SELECT level FROM {} WHERE {} = ? AND {} = ?",
        t.table, t.subject, t.object
    ))
    .bind(subject_id)
    .bind(object_id)
    .fetch_optional(conn)
    .await?)
}

async fn count_for_subject(
    conn: &mut SqliteConnection,
    t: &LinkTable,
    subject_id: i64,
) -> Result<i64, SecurityError> {
    Ok(sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM {} WHERE {} = ?",
        t.table, t.subject
    ))
    .bind(subject_id)
    .fetch_one(conn)
    .await?)
}

/// Insert a link at `position` (clamped into `[0, count]`, appended when
/// `None`). Returns `Ok(false)` without touching anything if the link already
/// exists.
pub(crate) async fn insert(
    conn: &mut SqliteConnection,
    t: &LinkTable,
    subject_id: i64,
    object_id: i64,
    position: Option<i64>,
) -> Result<bool, SecurityError> {
    if exists(&mut *conn, t, subject_id, object_id).await? {
        return Ok(false);
    }

    let count = count_for_subject(&mut *conn, t, subject_id).await?;
    let level = position.map_or(count, |p| p.clamp(0, count));

    sqlx::query(&format!(
        "UPDATE {} SET level = level + 1 WHERE {} = ? AND level >= ?",
        t.table, t.subject
    ))
    .bind(subject_id)
    .bind(level)
    .execute(&mut *conn)
    .await?;

    sqlx::query(&format!(
        "INSERT INTO {} ({}, {}, level) VALUES (?, ?, ?)",
        t.table, t.subject, t.object
    ))
    .bind(subject_id)
    .bind(object_id)
    .bind(level)
    .execute(conn)
    .await?;

    Ok(true)
}

/// Remove a link and close the ordering gap it leaves. `Ok(false)` when the
/// link was not there.
pub(crate) async fn remove(
    conn: &mut SqliteConnection,
    t: &LinkTable,
    subject_id: i64,
    object_id: i64,
) -> Result<bool, SecurityError> {
    let Some(level) = level_of(&mut *conn, t, subject_id, object_id).await? else {
        return Ok(false);
    };

    sqlx::query(&format!(
        "DELETE FROM {} WHERE {} = ? AND {} = ?",
        t.table, t.subject, t.object
    ))
    .bind(subject_id)
    .bind(object_id)
    .execute(&mut *conn)
    .await?;

    sqlx::query(&format!(
        "UPDATE {} SET level = level - 1 WHERE {} = ? AND level > ?",
        t.table, t.subject
    ))
    .bind(subject_id)
    .bind(level)
    .execute(conn)
    .await?;

    Ok(true)
}

/// Swap `old_object_id` for `new_object_id` in place, keeping the level the
/// old link held. `Ok(false)` when the old link does not exist.
pub(crate) async fn replace(
    conn: &mut SqliteConnection,
    t: &LinkTable,
    subject_id: i64,
    old_object_id: i64,
    new_object_id: i64,
) -> Result<bool, SecurityError> {
    if level_of(&mut *conn, t, subject_id, old_object_id).await?.is_none() {
        return Ok(false);
    }
    if exists(&mut *conn, t, subject_id, new_object_id).await? {
        return Err(SecurityError::AlreadyExists);
    }

    sqlx::query(&format!(
        "UPDATE {} SET {} = ? WHERE {} = ? AND {} = ?",
        t.table, t.object, t.subject, t.object
    ))
    .bind(new_object_id)
    .bind(subject_id)
    .bind(old_object_id)
    .execute(conn)
    .await?;

    Ok(true)
}

/// Unlink everything for one subject. Returns the number of rows removed.
pub(crate) async fn remove_all_for_subject(
    conn: &mut SqliteConnection,
    t: &LinkTable,
    subject_id: i64,
) -> Result<u64, SecurityError> {
    let done = sqlx::query(&format!("DELETE FROM {} WHERE {} = ?", t.table, t.subject))
        .bind(subject_id)
        .execute(conn)
        .await?;
    Ok(done.rows_affected())
}

/// Unlink one object from every subject, closing the gap in each affected
/// subject's ordering.
pub(crate) async fn remove_all_for_object(
    conn: &mut SqliteConnection,
    t: &LinkTable,
    object_id: i64,
) -> Result<u64, SecurityError> {
    let holders: Vec<(i64, i64)> = sqlx::query_as(&format!(
        "SELECT {}, level FROM {} WHERE {} = ?",
        t.subject, t.table, t.object
    ))
    .bind(object_id)
    .fetch_all(&mut *conn)
    .await?;

    sqlx::query(&format!("DELETE FROM {} WHERE {} = ?", t.table, t.object))
        .bind(object_id)
        .execute(&mut *conn)
        .await?;

    for (subject_id, level) in &holders {
        sqlx::query(&format!(
            "UPDATE {} SET level = level - 1 WHERE {} = ? AND level > ?",
            t.table, t.subject
        ))
        .bind(subject_id)
        .bind(level)
        .execute(&mut *conn)
        .await?;
    }

    Ok(holders.len() as u64)
}

/// Every link row of one table, ordered by subject then level. Used by the
/// migrator to replay relationships in precedence order.
pub(crate) async fn all_rows(
    conn: &mut SqliteConnection,
    t: &LinkTable,
) -> Result<Vec<(i64, i64, i64)>, SecurityError> {
    Ok(sqlx::query_as(&format!(
        "SELECT {}, {}, level FROM {} ORDER BY {}, level",
        t.subject, t.object, t.table, t.subject
    ))
    .fetch_all(conn)
    .await?)
}
