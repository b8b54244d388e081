//! Persisted entities and the enums shared across managers.

pub mod policy;
pub mod role;
pub mod rule;
pub mod token_rule;
pub mod user;

pub use policy::{Policy, PolicyBody, PolicyEffect};
pub use role::Role;
pub use rule::Rule;
pub use token_rule::{SubjectKind, TokenRule, TokenSubject};
pub use user::User;
