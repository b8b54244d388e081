use thiserror::Error;

/// Error signals returned by the security managers.
///
/// Storage faults raised inside a scope are converted into one of these
/// variants (or trigger a rollback); a raw driver error never escapes a
/// completed scope untyped.
#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("user does not exist")]
    UserNotExist,

    #[error("role does not exist")]
    RoleNotExist,

    #[error("policy does not exist")]
    PolicyNotExist,

    #[error("rule does not exist")]
    RuleNotExist,

    #[error("resource already exists")]
    AlreadyExists,

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("invalid value: {0}")]
    Invalid(String),

    #[error("admin resource {0} is protected")]
    ProtectedResource(i64),

    #[error("no session connected for database '{0}'")]
    SessionNotFound(String),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("dataset error: {0}")]
    Dataset(#[from] serde_yaml::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
