//! Password hashing and verification using Argon2id
//!
//! Hashes are PHC strings (algorithm, parameters, salt and digest in one
//! value), so the stored hash is all that is needed to verify later, even
//! after the configured cost changes.
//!
//! Both operations are CPU-bound and run on the blocking thread pool.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params,
};
use thiserror::Error;
use tibu_core::PasswordConfig;

/// Password hashing and verification errors
#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("Password must be at least {min} characters long")]
    TooShort { min: usize },

    #[error("Failed to hash password: {0}")]
    HashingFailed(String),

    #[error("Failed to verify password: {0}")]
    VerificationFailed(String),

    #[error("Invalid password hash format")]
    InvalidHashFormat,
}

/// Argon2id hasher bound to a fixed cost and length policy
#[derive(Debug, Clone)]
pub struct CredentialHasher {
    config: PasswordConfig,
    min_length: usize,
    /// Hash of a throwaway password at the configured cost
    dummy_hash: Option<Arc<str>>,
    verifications: Arc<AtomicU64>,
}

impl CredentialHasher {
    pub fn new(config: PasswordConfig, min_length: usize) -> Self {
        let dummy_hash = match hash_password_with_config("tibu-dummy-password", &config) {
            Ok(hash) => Some(Arc::from(hash)),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to precompute dummy password hash");
                None
            }
        };

        Self {
            config,
            min_length,
            dummy_hash,
            verifications: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn min_length(&self) -> usize {
        self.min_length
    }

    /// Check the length policy without doing any hashing work
    ///
    /// Length is counted in characters, not bytes.
    pub fn validate(&self, password: &str) -> Result<(), PasswordError> {
        if password.chars().count() < self.min_length {
            return Err(PasswordError::TooShort {
                min: self.min_length,
            });
        }
        Ok(())
    }

    /// Hash a plaintext password
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - PHC string format hash
    /// * `Err(PasswordError::TooShort)` - Policy violation, nothing was hashed
    /// * `Err(PasswordError)` - If hashing fails
    pub async fn hash(&self, password: &str) -> Result<String, PasswordError> {
        self.validate(password)?;

        let password = password.to_string();
        let config = self.config.clone();

        tokio::task::spawn_blocking(move || hash_password_with_config(&password, &config))
            .await
            .map_err(|e| PasswordError::HashingFailed(format!("Task join error: {e}")))?
    }

    /// Verify a plaintext password against a stored hash
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - Password matches
    /// * `Ok(false)` - Password does not match
    /// * `Err(PasswordError)` - If the stored hash is not a valid PHC string
    pub async fn verify(&self, password: &str, hash: &str) -> Result<bool, PasswordError> {
        self.verifications.fetch_add(1, Ordering::Relaxed);

        let password = password.to_string();
        let hash = hash.to_string();

        tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| PasswordError::VerificationFailed(format!("Task join error: {e}")))?
    }

    /// Spend the same work as [`verify`](Self::verify) when there is no
    /// stored hash to check against
    ///
    /// The outcome is discarded.
    pub async fn verify_dummy(&self, password: &str) {
        let Some(hash) = self.dummy_hash.clone() else {
            return;
        };

        if let Err(e) = self.verify(password, &hash).await {
            tracing::warn!(error = %e, "Dummy password verification failed");
        }
    }

    /// Number of verifications run by this hasher and its clones
    pub fn verification_count(&self) -> u64 {
        self.verifications.load(Ordering::Relaxed)
    }
}

fn to_params(config: &PasswordConfig) -> Result<Params, PasswordError> {
    Params::new(
        config.memory_cost,
        config.time_cost,
        config.parallelism,
        config.output_len,
    )
    .map_err(|e| PasswordError::HashingFailed(e.to_string()))
}

/// Hash a password with the given Argon2id parameters
pub fn hash_password_with_config(
    password: &str,
    config: &PasswordConfig,
) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);

    let params = to_params(config)?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PasswordError::HashingFailed(e.to_string()))?;

    Ok(password_hash.to_string())
}

/// Verify a password against a PHC string
///
/// The parameters embedded in the hash are used, not the current config.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| PasswordError::InvalidHashFormat)?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::VerificationFailed(e.to_string())),
    }
}
