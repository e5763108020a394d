//! Credential Store primitives.
//!
//! Secrets are hashed with Argon2id into a PHC string. Hashing is CPU-heavy, so both
//! hashing and verification run on the blocking pool. A [`HashedSecret`] can only be
//! produced from a plaintext by [`HashedSecret::hash`] or loaded back from storage; there
//! is no path that re-hashes an already stored secret.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use std::fmt;

use crate::error::FieldError;

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MAX_PASSWORD_LEN: usize = 20;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("failed to hash secret: {0}")]
    Hash(String),
    #[error("stored secret is malformed: {0}")]
    Malformed(String),
    #[error("hashing task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A one-way, salted hash of a user's password.
#[derive(Clone, PartialEq, Eq, sqlx::Type)]
#[sqlx(transparent)]
pub struct HashedSecret(String);

impl HashedSecret {
    /// Hashes `plain` with a fresh random salt.
    pub async fn hash(plain: &str) -> Result<Self, CredentialError> {
        let plain = plain.to_owned();
        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            Argon2::default()
                .hash_password(plain.as_bytes(), &salt)
                .map(|hash| HashedSecret(hash.to_string()))
                .map_err(|e| CredentialError::Hash(e.to_string()))
        })
        .await?
    }

    /// Wraps a PHC string read back from storage.
    pub fn from_stored(phc: String) -> Self {
        HashedSecret(phc)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `Ok(false)` on mismatch, `Err` only if the stored hash cannot be parsed.
    pub async fn verify(&self, plain: &str) -> Result<bool, CredentialError> {
        let stored = self.0.clone();
        let plain = plain.to_owned();
        tokio::task::spawn_blocking(move || {
            let parsed =
                PasswordHash::new(&stored).map_err(|e| CredentialError::Malformed(e.to_string()))?;
            Ok(Argon2::default()
                .verify_password(plain.as_bytes(), &parsed)
                .is_ok())
        })
        .await?
    }
}

impl fmt::Debug for HashedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HashedSecret(..)")
    }
}

/// Checks a registration password: 6 to 20 characters with at least one letter and one digit.
pub fn check_password_policy(password: &str) -> Vec<FieldError> {
    let mut errors = Vec::new();
    let len = password.chars().count();
    if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&len) {
        errors.push(FieldError::new(
            "password",
            format!("password must be between {MIN_PASSWORD_LEN} and {MAX_PASSWORD_LEN} characters"),
        ));
    }
    let has_letter = password.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !(has_letter && has_digit) {
        errors.push(FieldError::new(
            "password",
            "password must contain both letters and digits",
        ));
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_verifies_only_the_original_secret() {
        let hashed = HashedSecret::hash("secret123").await.unwrap();
        assert!(hashed.as_str().starts_with("$argon2id$"));
        assert!(hashed.verify("secret123").await.unwrap());
        assert!(!hashed.verify("secret124").await.unwrap());
    }

    #[tokio::test]
    async fn same_secret_gets_distinct_salts() {
        let a = HashedSecret::hash("secret123").await.unwrap();
        let b = HashedSecret::hash("secret123").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn malformed_stored_hash_is_an_error() {
        let broken = HashedSecret::from_stored("not-a-phc-string".to_string());
        assert!(broken.verify("anything1").await.is_err());
    }

    #[test]
    fn debug_output_hides_the_hash() {
        let secret = HashedSecret::from_stored("$argon2id$v=19$abc".to_string());
        assert_eq!(format!("{secret:?}"), "HashedSecret(..)");
    }

    #[test]
    fn password_policy() {
        assert!(check_password_policy("abc123").is_empty());
        assert_eq!(check_password_policy("ab12").len(), 1);
        assert_eq!(check_password_policy("abcdefgh").len(), 1);
        assert_eq!(check_password_policy("12345678").len(), 1);
        assert_eq!(check_password_policy("a1b2c3d4e5f6g7h8i9j0k").len(), 1);
        assert_eq!(check_password_policy("abc").len(), 2);
    }
}
