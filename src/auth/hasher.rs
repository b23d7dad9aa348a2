//! Password hashing.
//!
//! Hashes are Argon2id PHC strings. Hashing and verification are CPU bound, so
//! async callers go through [`hash_blocking`] and [`matches_blocking`].

use anyhow::{anyhow, Context, Result};
use argon2::{
    password_hash::SaltString, Algorithm, Argon2, Params, PasswordHash, PasswordHasher as _,
    PasswordVerifier, Version,
};
use rand::rngs::OsRng;
use std::sync::Arc;

pub trait PasswordHasher: Send + Sync {
    /// # Errors
    /// Returns an error if the hash cannot be computed.
    fn hash(&self, password: &str) -> Result<String>;

    /// False for a mismatch and for a malformed stored hash alike.
    fn matches(&self, password: &str, hash: &str) -> bool;
}

#[derive(Clone, Debug, Default)]
pub struct Argon2Hasher {
    params: Params,
}

impl Argon2Hasher {
    #[must_use]
    pub fn new(params: Params) -> Self {
        Self { params }
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| anyhow!("failed to hash password: {err}"))
    }

    fn matches(&self, password: &str, hash: &str) -> bool {
        PasswordHash::new(hash).is_ok_and(|parsed| {
            self.argon2()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
    }
}

/// # Errors
/// Returns an error if hashing fails or the blocking task panics.
pub async fn hash_blocking(hasher: Arc<dyn PasswordHasher>, password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || hasher.hash(&password))
        .await
        .context("password hashing task failed")?
}

pub async fn matches_blocking(
    hasher: Arc<dyn PasswordHasher>,
    password: String,
    hash: String,
) -> bool {
    tokio::task::spawn_blocking(move || hasher.matches(&password, &hash))
        .await
        .unwrap_or(false)
}

#[cfg(test)]
pub(crate) fn test_hasher() -> Arc<dyn PasswordHasher> {
    // Minimum Argon2 cost keeps debug-build tests fast.
    let params = Params::new(8, 1, 1, None).expect("valid argon2 params");
    Arc::new(Argon2Hasher::new(params))
}
