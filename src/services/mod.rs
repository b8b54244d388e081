//! Scoped managers over the security database.
//!
//! Every manager borrows one [`crate::db::SessionScope`] for its lifetime, so
//! all writes performed through it belong to that scope's transaction.

pub mod error;
pub(crate) mod links;
pub mod policies;
pub mod role_policies;
pub mod role_rules;
pub mod roles;
pub mod rules;
pub mod token;
pub mod user_roles;
pub mod users;

pub use policies::PoliciesManager;
pub use role_policies::RolesPoliciesManager;
pub use role_rules::RolesRulesManager;
pub use roles::RolesManager;
pub use rules::RulesManager;
pub use token::TokenManager;
pub use user_roles::UserRolesManager;
pub use users::AuthenticationManager;

use sqlx::sqlite::SqliteConnection;

use crate::services::error::SecurityError;

/// Endpoint existence checks shared by the relationship managers. Each maps a
/// missing endpoint to its kind-specific signal so callers can tell a missing
/// link apart from a missing entity.
pub(crate) async fn ensure_user(
    conn: &mut SqliteConnection,
    user_id: i64,
) -> Result<(), SecurityError> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(conn)
        .await?;
    found.map(|_| ()).ok_or(SecurityError::UserNotExist)
}

pub(crate) async fn ensure_role(
    conn: &mut SqliteConnection,
    role_id: i64,
) -> Result<(), SecurityError> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM roles WHERE id = ?")
        .bind(role_id)
        .fetch_optional(conn)
        .await?;
    found.map(|_| ()).ok_or(SecurityError::RoleNotExist)
}

pub(crate) async fn ensure_policy(
    conn: &mut SqliteConnection,
    policy_id: i64,
) -> Result<(), SecurityError> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM policies WHERE id = ?")
        .bind(policy_id)
        .fetch_optional(conn)
        .await?;
    found.map(|_| ()).ok_or(SecurityError::PolicyNotExist)
}

pub(crate) async fn ensure_rule(
    conn: &mut SqliteConnection,
    rule_id: i64,
) -> Result<(), SecurityError> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM rules WHERE id = ?")
        .bind(rule_id)
        .fetch_optional(conn)
        .await?;
    found.map(|_| ()).ok_or(SecurityError::RuleNotExist)
}

/// Next server-assigned id for an entity table: one past the current maximum,
/// never inside the reserved built-in range.
pub(crate) async fn next_id(
    conn: &mut SqliteConnection,
    table: &'static str,
) -> Result<i64, SecurityError> {
    let max: i64 = sqlx::query_scalar(&format!("SELECT COALESCE(MAX(id), 0) FROM {table}"))
        .fetch_one(conn)
        .await?;
    Ok(max.max(crate::MAX_ID_RESERVED - 1) + 1)
}

/// Name length bound shared by every entity kind. Counted in characters, not
/// bytes, so multibyte names get the same budget.
pub(crate) fn check_name(name: &str) -> Result<(), SecurityError> {
    if name.chars().count() > crate::MAX_NAME_LENGTH {
        return Err(SecurityError::Constraint(format!(
            "name exceeds {} characters",
            crate::MAX_NAME_LENGTH
        )));
    }
    Ok(())
}
