//! Signing and verification key material
//!
//! Keys are read once at startup from [`AuthConfig`] and handed to the
//! [`TokenService`](super::jwt::TokenService) constructor. One algorithm is
//! used for both access and refresh tokens.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tibu_core::{AuthConfig, Environment, SigningAlgorithm};

/// Well-known HS256 secret used when running locally without keys
pub const DEVELOPMENT_PLACEHOLDER_SECRET: &str = "THISISNOTANACTUALPRIVATEKEY";

/// Key loading errors
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Missing key material: {0}")]
    Missing(&'static str),

    #[error("Failed to read key file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid key material: {0}")]
    Invalid(String),
}

/// Immutable signing/verification key pair
///
/// For HS256 both halves are derived from the same secret.
#[derive(Clone)]
pub struct KeyMaterial {
    algorithm: Algorithm,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyMaterial {
    /// HS256 keys from a shared secret
    pub fn from_secret(secret: &[u8]) -> Result<Self, KeyError> {
        if secret.is_empty() {
            return Err(KeyError::Invalid("HS256 secret is empty".to_string()));
        }

        Ok(Self {
            algorithm: Algorithm::HS256,
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        })
    }

    /// RS256 keys from PEM-encoded private and public keys
    pub fn from_rsa_pem(private_pem: &[u8], public_pem: &[u8]) -> Result<Self, KeyError> {
        let encoding = EncodingKey::from_rsa_pem(private_pem)
            .map_err(|e| KeyError::Invalid(format!("private key: {e}")))?;
        let decoding = DecodingKey::from_rsa_pem(public_pem)
            .map_err(|e| KeyError::Invalid(format!("public key: {e}")))?;

        Ok(Self {
            algorithm: Algorithm::RS256,
            encoding,
            decoding,
        })
    }

    /// Placeholder keys for local development
    pub fn development_placeholder() -> Self {
        Self {
            algorithm: Algorithm::HS256,
            encoding: EncodingKey::from_secret(DEVELOPMENT_PLACEHOLDER_SECRET.as_bytes()),
            decoding: DecodingKey::from_secret(DEVELOPMENT_PLACEHOLDER_SECRET.as_bytes()),
        }
    }

    /// Load the configured key material
    ///
    /// In [`Environment::Development`] unreadable or missing keys fall back to
    /// the placeholder secret with a warning. Everywhere else the error is
    /// returned and the caller is expected to abort startup.
    pub fn load(config: &AuthConfig, environment: Environment) -> Result<Self, KeyError> {
        match Self::load_configured(config) {
            Ok(keys) => Ok(keys),
            Err(e) if environment.is_development() => {
                tracing::warn!(
                    error = %e,
                    "Using placeholder signing key; never run like this outside development"
                );
                Ok(Self::development_placeholder())
            }
            Err(e) => Err(e),
        }
    }

    fn load_configured(config: &AuthConfig) -> Result<Self, KeyError> {
        match config.algorithm {
            SigningAlgorithm::Hs256 => {
                if let Some(secret) = &config.jwt_secret {
                    return Self::from_secret(secret.as_bytes());
                }
                let path = config
                    .jwt_secret_path
                    .as_deref()
                    .ok_or(KeyError::Missing("JWT_SECRET or JWT_SECRET_PATH"))?;
                let secret = read_key_file(path)?;
                Self::from_secret(trim_trailing_newline(&secret))
            }
            SigningAlgorithm::Rs256 => {
                let private_path = config
                    .private_key_path
                    .as_deref()
                    .ok_or(KeyError::Missing("PRIVATE_KEY_PATH"))?;
                let public_path = config
                    .public_key_path
                    .as_deref()
                    .ok_or(KeyError::Missing("PUBLIC_KEY_PATH"))?;

                let private_pem = read_key_file(private_path)?;
                let public_pem = read_key_file(public_path)?;
                Self::from_rsa_pem(&private_pem, &public_pem)
            }
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

fn read_key_file(path: &Path) -> Result<Vec<u8>, KeyError> {
    std::fs::read(path).map_err(|e| KeyError::Unreadable {
        path: path.to_path_buf(),
        source: e,
    })
}

fn trim_trailing_newline(bytes: &[u8]) -> &[u8] {
    let mut end = bytes.len();
    while end > 0 && matches!(bytes[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    &bytes[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_from_config() {
        let config = AuthConfig {
            jwt_secret: Some("configured-secret".to_string()),
            ..Default::default()
        };

        let keys = KeyMaterial::load(&config, Environment::Production).unwrap();
        assert_eq!(keys.algorithm(), Algorithm::HS256);
    }

    #[test]
    fn test_missing_secret_is_fatal_outside_development() {
        let config = AuthConfig::default();

        let result = KeyMaterial::load(&config, Environment::Production);
        assert!(matches!(result, Err(KeyError::Missing(_))));

        let result = KeyMaterial::load(&config, Environment::Test);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_secret_falls_back_in_development() {
        let config = AuthConfig::default();
        let keys = KeyMaterial::load(&config, Environment::Development).unwrap();
        assert_eq!(keys.algorithm(), Algorithm::HS256);
    }

    #[test]
    fn test_unreadable_rsa_keys() {
        let config = AuthConfig {
            algorithm: SigningAlgorithm::Rs256,
            private_key_path: Some(PathBuf::from("/nonexistent/private.pem")),
            public_key_path: Some(PathBuf::from("/nonexistent/public.pem")),
            ..Default::default()
        };

        let result = KeyMaterial::load(&config, Environment::Production);
        assert!(matches!(result, Err(KeyError::Unreadable { .. })));
    }

    #[test]
    fn test_invalid_rsa_pem() {
        let result = KeyMaterial::from_rsa_pem(b"not a key", b"not a key");
        assert!(matches!(result, Err(KeyError::Invalid(_))));
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(matches!(
            KeyMaterial::from_secret(b""),
            Err(KeyError::Invalid(_))
        ));
    }

    #[test]
    fn test_trailing_newline_is_trimmed() {
        assert_eq!(trim_trailing_newline(b"secret\r\n"), b"secret");
        assert_eq!(trim_trailing_newline(b"secret"), b"secret");
        assert_eq!(trim_trailing_newline(b"\n"), b"");
    }

    #[test]
    fn test_debug_hides_keys() {
        let keys = KeyMaterial::from_secret(b"do-not-print").unwrap();
        let debug = format!("{keys:?}");
        assert!(!debug.contains("do-not-print"));
        assert!(debug.contains("HS256"));
    }
}
