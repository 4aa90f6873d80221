//! JWT token generation and validation
//!
//! Access tokens carry identity, role and display name and expire after a
//! configured lifetime. Refresh tokens carry identity only and never expire on
//! their own; their validity is the existence of the session named by `jti`.

use jsonwebtoken::{decode, encode, errors::ErrorKind, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tibu_core::{now_epoch, AuthConfig, User};

use super::keys::KeyMaterial;

/// Claims embedded in access and refresh tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - user ID as a decimal string
    pub sub: String,
    /// Session ID as a decimal string
    pub jti: String,
    /// Token issuer
    pub iss: String,
    /// Token audience
    pub aud: String,
    /// Issued at (Unix epoch seconds)
    pub iat: i64,
    /// Expiration (Unix epoch seconds); access tokens only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// User's role; access tokens only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// User's display name; access tokens only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Claims {
    pub fn user_id(&self) -> Result<i64, TokenError> {
        self.sub
            .parse()
            .map_err(|_| TokenError::Malformed(format!("subject is not a user id: {}", self.sub)))
    }

    pub fn session_id(&self) -> Result<i64, TokenError> {
        self.jti
            .parse()
            .map_err(|_| TokenError::Malformed(format!("jti is not a session id: {}", self.jti)))
    }
}

/// Shape accepted when decoding, so a missing subject can be told apart
/// from other malformations.
#[derive(Debug, Deserialize)]
struct DecodedClaims {
    sub: Option<String>,
    jti: Option<String>,
    #[serde(default)]
    iss: String,
    #[serde(default)]
    aud: String,
    #[serde(default)]
    iat: i64,
    exp: Option<i64>,
    role: Option<String>,
    name: Option<String>,
}

/// Which token class a verification expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT token generation and validation errors
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Token has expired")]
    Expired,

    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Invalid token signature")]
    SignatureInvalid,

    #[error("Token has no subject")]
    MissingSubject,

    #[error("Failed to encode JWT: {0}")]
    Encoding(String),
}

/// Signs and verifies both token classes with one key pair
#[derive(Debug, Clone)]
pub struct TokenService {
    keys: KeyMaterial,
    issuer: String,
    audience: String,
    access_ttl_secs: u64,
}

impl TokenService {
    pub fn new(
        keys: KeyMaterial,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        access_ttl_secs: u64,
    ) -> Self {
        Self {
            keys,
            issuer: issuer.into(),
            audience: audience.into(),
            access_ttl_secs,
        }
    }

    pub fn from_config(keys: KeyMaterial, config: &AuthConfig) -> Self {
        Self::new(
            keys,
            config.issuer.clone(),
            config.audience.clone(),
            config.access_token_ttl_secs,
        )
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Encode an arbitrary claim set with the configured key
    pub fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(
            &Header::new(self.keys.algorithm()),
            claims,
            self.keys.encoding_key(),
        )
        .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    /// Sign an access token for `user` bound to `session_id`
    pub fn issue_access_token(&self, user: &User, session_id: i64) -> Result<String, TokenError> {
        let now = now_epoch();
        let exp = i64::try_from(self.access_ttl_secs)
            .ok()
            .and_then(|ttl| now.checked_add(ttl))
            .ok_or_else(|| {
                TokenError::Encoding("access token lifetime out of range".to_string())
            })?;
        let claims = Claims {
            sub: user.id.to_string(),
            jti: session_id.to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now,
            exp: Some(exp),
            role: Some(user.role.as_str().to_string()),
            name: Some(user.name.clone()),
        };

        self.sign(&claims)
    }

    /// Sign a refresh token for `user_id` bound to `session_id`
    pub fn issue_refresh_token(&self, user_id: i64, session_id: i64) -> Result<String, TokenError> {
        let claims = Claims {
            sub: user_id.to_string(),
            jti: session_id.to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now_epoch(),
            exp: None,
            role: None,
            name: None,
        };

        self.sign(&claims)
    }

    /// Validate a token and extract its claims
    ///
    /// Both kinds must carry issuer and audience matching the configured
    /// values. Access tokens must carry an `exp` that has not passed; there is
    /// no clock-skew allowance. Refresh tokens are not checked for expiry.
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(self.keys.algorithm());
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.leeway = 0;

        match kind {
            TokenKind::Access => validation.set_required_spec_claims(&["exp", "iss", "aud"]),
            TokenKind::Refresh => {
                validation.set_required_spec_claims(&["iss", "aud"]);
                validation.validate_exp = false;
            }
        }

        let token_data = decode::<DecodedClaims>(token, self.keys.decoding_key(), &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::SignatureInvalid,
                _ => TokenError::Malformed(e.to_string()),
            })?;

        let decoded = token_data.claims;
        let sub = decoded.sub.ok_or(TokenError::MissingSubject)?;
        let jti = decoded
            .jti
            .ok_or_else(|| TokenError::Malformed("missing jti".to_string()))?;

        Ok(Claims {
            sub,
            jti,
            iss: decoded.iss,
            aud: decoded.aud,
            iat: decoded.iat,
            exp: decoded.exp,
            role: decoded.role,
            name: decoded.name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tibu_core::Role;

    fn service() -> TokenService {
        TokenService::new(
            KeyMaterial::from_secret(b"test-secret").unwrap(),
            "api.tibu.nu",
            "api.tibu.nu",
            3600,
        )
    }

    fn user() -> User {
        User {
            id: 42,
            email: "ana@x.com".to_string(),
            name: "Ana".to_string(),
            password_hash: String::new(),
            role: Role::Admin,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_access_token_round_trip() {
        let service = service();
        let token = service.issue_access_token(&user(), 7).unwrap();
        let claims = service.verify(&token, TokenKind::Access).unwrap();

        assert_eq!(claims.user_id().unwrap(), 42);
        assert_eq!(claims.session_id().unwrap(), 7);
        assert_eq!(claims.iss, "api.tibu.nu");
        assert_eq!(claims.aud, "api.tibu.nu");
        assert_eq!(claims.role.as_deref(), Some("ADMIN"));
        assert_eq!(claims.name.as_deref(), Some("Ana"));
        assert_eq!(claims.exp, Some(claims.iat + 3600));
    }

    #[test]
    fn test_refresh_token_has_no_expiry() {
        let service = service();
        let token = service.issue_refresh_token(42, 7).unwrap();
        let claims = service.verify(&token, TokenKind::Refresh).unwrap();

        assert_eq!(claims.sub, "42");
        assert_eq!(claims.jti, "7");
        assert!(claims.exp.is_none());
        assert!(claims.role.is_none());
        assert!(claims.name.is_none());
    }

    #[test]
    fn test_refresh_token_is_not_an_access_token() {
        let service = service();
        let token = service.issue_refresh_token(42, 7).unwrap();
        let result = service.verify(&token, TokenKind::Access);
        assert!(matches!(result, Err(TokenError::Malformed(_))));
    }

    #[test]
    fn test_garbage_token() {
        let result = service().verify("invalid.token.here", TokenKind::Access);
        assert!(matches!(result, Err(TokenError::Malformed(_))));
    }

    #[test]
    fn test_wrong_secret() {
        let other = TokenService::new(
            KeyMaterial::from_secret(b"other-secret").unwrap(),
            "api.tibu.nu",
            "api.tibu.nu",
            3600,
        );
        let token = other.issue_access_token(&user(), 1).unwrap();

        let result = service().verify(&token, TokenKind::Access);
        assert!(matches!(result, Err(TokenError::SignatureInvalid)));
    }

    #[test]
    fn test_wrong_issuer_and_audience() {
        let service = service();

        let foreign_issuer = TokenService::new(
            KeyMaterial::from_secret(b"test-secret").unwrap(),
            "someone.else",
            "api.tibu.nu",
            3600,
        );
        let token = foreign_issuer.issue_access_token(&user(), 1).unwrap();
        assert!(matches!(
            service.verify(&token, TokenKind::Access),
            Err(TokenError::Malformed(_))
        ));

        let foreign_audience = TokenService::new(
            KeyMaterial::from_secret(b"test-secret").unwrap(),
            "api.tibu.nu",
            "someone.else",
            3600,
        );
        let token = foreign_audience.issue_refresh_token(42, 1).unwrap();
        assert!(matches!(
            service.verify(&token, TokenKind::Refresh),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn test_expired_token() {
        let service = service();
        let now = now_epoch();

        let token = service
            .sign(&Claims {
                sub: "42".to_string(),
                jti: "7".to_string(),
                iss: "api.tibu.nu".to_string(),
                aud: "api.tibu.nu".to_string(),
                iat: now - 7200,
                exp: Some(now - 3600),
                role: Some("USER".to_string()),
                name: Some("Ana".to_string()),
            })
            .unwrap();

        let result = service.verify(&token, TokenKind::Access);
        assert!(matches!(result, Err(TokenError::Expired)));
    }

    #[test]
    fn test_recently_expired_token_is_rejected() {
        let service = service();
        let now = now_epoch();

        let token = service
            .sign(&Claims {
                sub: "42".to_string(),
                jti: "7".to_string(),
                iss: "api.tibu.nu".to_string(),
                aud: "api.tibu.nu".to_string(),
                iat: now - 3600,
                exp: Some(now - 30),
                role: Some("USER".to_string()),
                name: Some("Ana".to_string()),
            })
            .unwrap();

        let result = service.verify(&token, TokenKind::Access);
        assert!(matches!(result, Err(TokenError::Expired)));
    }

    #[test]
    fn test_missing_issuer_and_audience() {
        let service = service();
        let keys = KeyMaterial::from_secret(b"test-secret").unwrap();
        let now = now_epoch();

        let access = serde_json::json!({ "sub": "42", "jti": "7", "iat": now, "exp": now + 600 });
        let token = encode(&Header::default(), &access, keys.encoding_key()).unwrap();
        let result = service.verify(&token, TokenKind::Access);
        assert!(matches!(result, Err(TokenError::Malformed(_))));

        let refresh = serde_json::json!({ "sub": "42", "jti": "7", "iat": now });
        let token = encode(&Header::default(), &refresh, keys.encoding_key()).unwrap();
        let result = service.verify(&token, TokenKind::Refresh);
        assert!(matches!(result, Err(TokenError::Malformed(_))));
    }

    #[test]
    fn test_oversized_access_ttl_is_an_encoding_error() {
        let service = TokenService::new(
            KeyMaterial::from_secret(b"test-secret").unwrap(),
            "api.tibu.nu",
            "api.tibu.nu",
            u64::MAX,
        );

        let result = service.issue_access_token(&user(), 7);
        assert!(matches!(result, Err(TokenError::Encoding(_))));
    }

    #[test]
    fn test_missing_subject() {
        let service = service();
        let now = now_epoch();
        let claims = serde_json::json!({
            "jti": "7",
            "iss": "api.tibu.nu",
            "aud": "api.tibu.nu",
            "iat": now,
            "exp": now + 60,
        });

        let keys = KeyMaterial::from_secret(b"test-secret").unwrap();
        let token = encode(&Header::default(), &claims, keys.encoding_key()).unwrap();

        let result = service.verify(&token, TokenKind::Access);
        assert!(matches!(result, Err(TokenError::MissingSubject)));
    }

    #[test]
    fn test_non_numeric_subject() {
        let claims = Claims {
            sub: "not-a-number".to_string(),
            jti: "7".to_string(),
            iss: String::new(),
            aud: String::new(),
            iat: 0,
            exp: None,
            role: None,
            name: None,
        };
        assert!(matches!(claims.user_id(), Err(TokenError::Malformed(_))));
        assert_eq!(claims.session_id().unwrap(), 7);
    }
}
