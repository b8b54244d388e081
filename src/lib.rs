//! rbac-store: transactional state store for role-based access control.
//!
//! Manages users, roles, policies and rules together with their ordered
//! many-to-many relationships, a token-invalidation ledger and the dataset
//! seeding/migration machinery. Authorization decisions themselves are taken
//! elsewhere; this crate only guarantees that the relationship graph those
//! decisions read from stays consistent.
//!
//! Every mutation runs inside a [`db::SessionScope`], one per logical
//! database, so a unit of work either commits as a whole or leaves no trace.

pub mod config;
pub mod db;
pub mod models;
pub mod observability;
pub mod seed;
pub mod services;
pub mod utils;

pub use services::error::SecurityError;

/// Identifiers strictly below this value belong to built-in (admin) resources
/// seeded from the default dataset. They cannot be deleted and server-assigned
/// ids for runtime-created resources start here.
pub const MAX_ID_RESERVED: i64 = 100;

/// Upper bound on resource names and usernames, enforced before any write.
pub const MAX_NAME_LENGTH: usize = 64;
