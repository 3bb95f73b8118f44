use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error("invalid password hash format: {0}")]
    InvalidHashFormat(String),
}

/// One-way transform of a plaintext secret into a storable hash.
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, plain: &str) -> Result<String, HashError>;

    /// `Ok(false)` on mismatch; errors only when `hash` cannot be parsed.
    fn verify(&self, plain: &str, hash: &str) -> Result<bool, HashError>;
}

/// Argon2id with the crate's default cost parameters and a fresh OS salt per hash.
#[derive(Debug, Clone, Default)]
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, plain: &str) -> Result<String, HashError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                HashError::Hashing(e.to_string())
            })?
            .to_string();
        Ok(hash)
    }

    fn verify(&self, plain: &str, hash: &str) -> Result<bool, HashError> {
        let parsed = PasswordHash::new(hash).map_err(|e| {
            error!(error = %e, "argon2 parse hash error");
            HashError::InvalidHashFormat(e.to_string())
        })?;
        match self.argon2.verify_password(plain.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(HashError::InvalidHashFormat(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let hasher = Argon2Hasher::default();
        let password = "Secur3P@ssw0rd!";
        let hash = hasher.hash(password).expect("hashing should succeed");
        assert!(hasher.verify(password, &hash).expect("verify should succeed"));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let hasher = Argon2Hasher::default();
        let hash = hasher
            .hash("correct-horse-battery-staple")
            .expect("hashing should succeed");
        assert!(!hasher
            .verify("wrong-password", &hash)
            .expect("verify should not error"));
    }

    #[test]
    fn verify_errors_on_malformed_hash() {
        let hasher = Argon2Hasher::default();
        let err = hasher.verify("anything", "not-a-valid-hash").unwrap_err();
        assert!(matches!(err, HashError::InvalidHashFormat(_)));
    }

    #[test]
    fn same_password_hashes_differently() {
        let hasher = Argon2Hasher::default();
        let a = hasher.hash("repeat-me").unwrap();
        let b = hasher.hash("repeat-me").unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("$argon2id$"));
        assert!(!a.contains("repeat-me"));
    }

    #[test]
    fn empty_plaintext_still_roundtrips() {
        let hasher = Argon2Hasher::default();
        let hash = hasher.hash("").unwrap();
        assert!(hasher.verify("", &hash).unwrap());
        assert!(!hasher.verify(" ", &hash).unwrap());
    }
}
