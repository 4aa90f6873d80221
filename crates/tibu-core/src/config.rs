//! Tibu Configuration Management
//!
//! Handles configuration from environment variables and TOML files, with
//! sensible defaults for local development. Configuration is loaded once at
//! startup and treated as immutable afterwards.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable naming an optional TOML configuration file
pub const CONFIG_PATH_ENV: &str = "TIBU_CONFIG";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Deployment environment
    pub environment: Environment,

    /// Server configuration
    pub server: ServerConfig,

    /// Database connection
    pub database: DatabaseConfig,

    /// Token signing and credential hashing
    pub auth: AuthConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Load from `TIBU_CONFIG` if set, then apply environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.is_empty() => Self::from_file(path)?.with_env_override(),
            _ => Self::from_env(),
        }
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(self)
    }

    /// Apply overrides from an arbitrary key lookup
    ///
    /// Only keys the lookup returns a value for are touched.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(env) = lookup("APP_ENV") {
            self.environment = env.parse()?;
        }

        // Server
        if let Some(host) = lookup("API_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("API_PORT") {
            self.server.port = parse_value("API_PORT", port)?;
        }
        if let Some(origins) = lookup("CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // PostgreSQL
        if let Some(url) = lookup("DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(size) = lookup("DATABASE_POOL_SIZE") {
            self.database.pool_size = parse_value("DATABASE_POOL_SIZE", size)?;
        }
        if let Some(run) = lookup("DATABASE_RUN_MIGRATIONS") {
            self.database.run_migrations = parse_value("DATABASE_RUN_MIGRATIONS", run)?;
        }

        // Tokens
        if let Some(algorithm) = lookup("JWT_ALGORITHM") {
            self.auth.algorithm = algorithm.parse()?;
        }
        if let Some(secret) = lookup("JWT_SECRET") {
            self.auth.jwt_secret = Some(secret);
        }
        if let Some(path) = lookup("JWT_SECRET_PATH") {
            self.auth.jwt_secret_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("PRIVATE_KEY_PATH") {
            self.auth.private_key_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("PUBLIC_KEY_PATH") {
            self.auth.public_key_path = Some(PathBuf::from(path));
        }
        if let Some(issuer) = lookup("TOKEN_ISSUER") {
            self.auth.issuer = issuer;
        }
        if let Some(audience) = lookup("TOKEN_AUDIENCE") {
            self.auth.audience = audience;
        }
        if let Some(ttl) = lookup("ACCESS_TOKEN_TTL_SECS") {
            self.auth.access_token_ttl_secs = parse_value("ACCESS_TOKEN_TTL_SECS", ttl)?;
        }

        // Logging
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = lookup("LOG_JSON") {
            self.logging.json_format = parse_value("LOG_JSON", json)?;
        }

        Ok(())
    }

    /// Reject configurations that would weaken the credential or token policy
    pub fn validate(&self) -> Result<(), ConfigError> {
        let floor = PasswordConfig::minimum();
        let password = &self.auth.password;
        if password.memory_cost < floor.memory_cost
            || password.time_cost < floor.time_cost
            || password.parallelism < floor.parallelism
        {
            return Err(ConfigError::InvalidValue {
                key: "auth.password".to_string(),
                value: format!(
                    "m={},t={},p={} is below the minimum m={},t={},p={}",
                    password.memory_cost,
                    password.time_cost,
                    password.parallelism,
                    floor.memory_cost,
                    floor.time_cost,
                    floor.parallelism
                ),
            });
        }

        if self.auth.min_password_length < AuthConfig::MIN_PASSWORD_LENGTH {
            return Err(ConfigError::InvalidValue {
                key: "auth.min_password_length".to_string(),
                value: self.auth.min_password_length.to_string(),
            });
        }

        let ttl = self.auth.access_token_ttl_secs;
        if ttl == 0 || ttl > AuthConfig::MAX_ACCESS_TOKEN_TTL_SECS {
            return Err(ConfigError::InvalidValue {
                key: "ACCESS_TOKEN_TTL_SECS".to_string(),
                value: ttl.to_string(),
            });
        }

        if self.auth.issuer.is_empty() {
            return Err(ConfigError::MissingRequired("TOKEN_ISSUER".to_string()));
        }
        if self.auth.audience.is_empty() {
            return Err(ConfigError::MissingRequired("TOKEN_AUDIENCE".to_string()));
        }

        Ok(())
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    })
}

/// Deployment environment
///
/// `Development` substitutes placeholder key material when none is configured
/// and exposes internal error details to API callers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

impl Environment {
    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

impl std::str::FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" | "local" => Ok(Self::Development),
            "test" => Ok(Self::Test),
            "production" | "prod" => Ok(Self::Production),
            _ => Err(ConfigError::InvalidValue {
                key: "APP_ENV".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Allowed origins for CORS
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            // Empty by default - set via CORS_ORIGINS env var
            cors_origins: vec![],
        }
    }
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// PostgreSQL connection pool size
    pub pool_size: u32,

    /// Apply pending migrations on startup
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://postgres@localhost:5432/tibu".to_string(),
            pool_size: 10,
            run_migrations: false,
        }
    }
}

/// Token signing algorithm shared by the signer and the verifier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SigningAlgorithm {
    /// HMAC-SHA256 with a shared secret
    #[default]
    #[serde(rename = "HS256")]
    Hs256,
    /// RSA-SHA256 with a PEM key pair
    #[serde(rename = "RS256")]
    Rs256,
}

impl std::str::FromStr for SigningAlgorithm {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "HS256" => Ok(Self::Hs256),
            "RS256" => Ok(Self::Rs256),
            _ => Err(ConfigError::InvalidValue {
                key: "JWT_ALGORITHM".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Authentication configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Signing algorithm for access and refresh tokens
    pub algorithm: SigningAlgorithm,

    /// HS256 shared secret
    #[serde(skip_serializing)]
    pub jwt_secret: Option<String>,

    /// File holding the HS256 shared secret
    pub jwt_secret_path: Option<PathBuf>,

    /// RS256 private key (PEM)
    pub private_key_path: Option<PathBuf>,

    /// RS256 public key (PEM)
    pub public_key_path: Option<PathBuf>,

    /// `iss` claim written and required
    pub issuer: String,

    /// `aud` claim written and required
    pub audience: String,

    /// Access token lifetime in seconds
    pub access_token_ttl_secs: u64,

    /// Minimum password length in characters
    pub min_password_length: usize,

    /// Password hashing cost
    pub password: PasswordConfig,
}

impl AuthConfig {
    /// Lowest accepted password length policy
    pub const MIN_PASSWORD_LENGTH: usize = 6;

    /// Longest accepted access token lifetime (one year)
    pub const MAX_ACCESS_TOKEN_TTL_SECS: u64 = 365 * 24 * 60 * 60;
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            algorithm: SigningAlgorithm::Hs256,
            jwt_secret: None,
            jwt_secret_path: None,
            private_key_path: None,
            public_key_path: None,
            issuer: "api.tibu.nu".to_string(),
            audience: "api.tibu.nu".to_string(),
            access_token_ttl_secs: 3600, // 1 hour
            min_password_length: Self::MIN_PASSWORD_LENGTH,
            password: PasswordConfig::default(),
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("algorithm", &self.algorithm)
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "<redacted>"))
            .field("jwt_secret_path", &self.jwt_secret_path)
            .field("private_key_path", &self.private_key_path)
            .field("public_key_path", &self.public_key_path)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("access_token_ttl_secs", &self.access_token_ttl_secs)
            .field("min_password_length", &self.min_password_length)
            .field("password", &self.password)
            .finish()
    }
}

/// Argon2id cost parameters
///
/// Increasing memory or iterations improves resistance to brute force but
/// slows down every login and registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordConfig {
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub memory_cost: u32,
    /// Time cost (iterations, default: 3)
    pub time_cost: u32,
    /// Parallelism (lanes, default: 4)
    pub parallelism: u32,
    /// Output length in bytes (default: 32)
    pub output_len: Option<usize>,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_cost: 65536, // 64 MiB
            time_cost: 3,
            parallelism: 4,
            output_len: Some(32),
        }
    }
}

impl PasswordConfig {
    /// OWASP minimum for Argon2id (19 MiB, 2 iterations, 1 lane)
    pub fn minimum() -> Self {
        Self {
            memory_cost: 19456,
            time_cost: 2,
            parallelism: 1,
            output_len: Some(32),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
