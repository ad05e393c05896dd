//! One-way digests for token secrets and directory passwords.
//!
//! Token secrets are 32 bytes of OS randomness, so a plain SHA-256 digest is
//! enough to keep raw values out of the store. Directory passwords are
//! user-chosen and get Argon2id instead. Both sit behind the same trait so
//! callers never learn which scheme a digest uses.

use anyhow::{Result, anyhow};
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Digest and verify secrets without ever persisting the raw value.
/// `verify` must not leak timing about how far a comparison got.
pub trait CredentialHasher: Send + Sync {
    /// Produce a storable digest of the secret.
    ///
    /// # Errors
    /// Returns an error if digest generation fails (e.g. salt generation).
    fn hash(&self, secret: &str) -> Result<String>;

    /// Compare a candidate secret against a stored digest in constant time.
    fn verify(&self, secret: &str, digest: &str) -> bool;
}

/// SHA-256 digests, base64url-encoded. Used for high-entropy token secrets.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sha256Hasher;

impl CredentialHasher for Sha256Hasher {
    fn hash(&self, secret: &str) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        Ok(URL_SAFE_NO_PAD.encode(hasher.finalize()))
    }

    fn verify(&self, secret: &str, digest: &str) -> bool {
        let Ok(expected) = URL_SAFE_NO_PAD.decode(digest) else {
            return false;
        };
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        let actual = hasher.finalize();
        expected.ct_eq(actual.as_slice()).into()
    }
}

/// Argon2id digests in PHC string format. Used for directory passwords.
#[derive(Clone, Default)]
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, secret: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let digest = self
            .argon2
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|err| anyhow!("failed to hash password: {err}"))?;
        Ok(digest.to_string())
    }

    fn verify(&self, secret: &str, digest: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(digest) else {
            return false;
        };
        self.argon2
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok()
    }
}
