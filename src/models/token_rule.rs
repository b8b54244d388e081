//! Token invalidation ledger entries.

use serde::{Deserialize, Serialize};

/// Which entity table a ledger entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum SubjectKind {
    User,
    Role,
}

/// A subject a token was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSubject {
    User(i64),
    Role(i64),
}

impl TokenSubject {
    pub fn kind(&self) -> SubjectKind {
        match self {
            TokenSubject::User(_) => SubjectKind::User,
            TokenSubject::Role(_) => SubjectKind::Role,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            TokenSubject::User(id) | TokenSubject::Role(id) => *id,
        }
    }
}

/// Ledger row: any credential for `subject` issued at or before `nbf`
/// (seconds since the epoch) must be treated as expired.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TokenRule {
    pub subject_kind: SubjectKind,
    pub subject_id: i64,
    pub nbf: i64,
}
