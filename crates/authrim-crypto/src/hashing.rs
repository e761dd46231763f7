//! Secret hashing for client credentials and user passwords

use anyhow::Result;
use argon2::password_hash::{PasswordHasher as ArgonPasswordHasher, SaltString};
use argon2::{Argon2, PasswordHash, PasswordVerifier};
use rand_core::OsRng;

/// Timing-safe byte comparison. Inputs of different length compare unequal;
/// equal-length inputs are compared without data-dependent branching.
pub fn timing_safe_eq(a: &[u8], b: &[u8]) -> bool {
    constant_time_eq::constant_time_eq(a, b)
}

/// Argon2id hasher for confidential-client secrets and user passwords.
#[derive(Debug, Clone)]
pub struct SecretHasher {
    argon2: Argon2<'static>,
}

impl SecretHasher {
    pub fn new() -> Self {
        Self {
            argon2: Argon2::default(),
        }
    }

    pub fn hash_secret(&self, secret: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Secret hashing failed: {}", e))?
            .to_string();
        Ok(hash)
    }

    /// Verify a presented secret against its stored hash. Argon2 verification
    /// is inherently constant-time with respect to the secret material.
    pub fn verify_secret(&self, secret: &str, hash: &str) -> Result<bool> {
        let parsed =
            PasswordHash::new(hash).map_err(|e| anyhow::anyhow!("Invalid secret hash: {}", e))?;
        Ok(self
            .argon2
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok())
    }
}

impl Default for SecretHasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let hasher = SecretHasher::new();
        let hash = hasher.hash_secret("s3cr3t-client-secret").unwrap();
        assert!(hasher.verify_secret("s3cr3t-client-secret", &hash).unwrap());
        assert!(!hasher.verify_secret("wrong-secret", &hash).unwrap());
    }

    #[test]
    fn timing_safe_eq_handles_length_mismatch() {
        assert!(timing_safe_eq(b"abc", b"abc"));
        assert!(!timing_safe_eq(b"abc", b"abcd"));
        assert!(!timing_safe_eq(b"abc", b"abd"));
    }
}
