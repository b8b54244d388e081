use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::services::error::SecurityError;

/// Newtype for a plaintext password to prevent accidental logging.
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Newtype for the stored argon2 digest.
#[derive(Debug, Clone)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Hash a password with Argon2id and a fresh random salt.
pub fn hash_password(password: &Password) -> Result<PasswordHashString, SecurityError> {
    let salt = SaltString::generate(&mut OsRng);
    let digest = Argon2::default()
        .hash_password(password.as_str().as_bytes(), &salt)
        .map_err(|e| SecurityError::PasswordHash(e.to_string()))?
        .to_string();
    Ok(PasswordHashString::new(digest))
}

/// Verify a password against a stored digest. Returns `Ok(false)` on mismatch;
/// an error means the stored digest itself is unreadable.
pub fn check_password(
    password: &Password,
    digest: &PasswordHashString,
) -> Result<bool, SecurityError> {
    let parsed = PasswordHash::new(digest.as_str())
        .map_err(|e| SecurityError::PasswordHash(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_str().as_bytes(), &parsed)
        .is_ok())
}
