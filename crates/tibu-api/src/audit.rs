//! Security audit logging for authentication events
//!
//! Logins, logouts, registrations, token refreshes, role changes and
//! access-control failures are logged at INFO level with the `audit` target,
//! so they can be filtered and routed separately from application logs:
//!
//! ```text
//! RUST_LOG=info,audit=info
//! ```
//!
//! Each event is also serialized to JSON and attached as the `event` field:
//!
//! ```json
//! {
//!   "event_type": "login_success",
//!   "user_id": 42,
//!   "email": "ana@x.com",
//!   "ip_address": "192.168.1.1",
//!   "user_agent": "Mozilla/5.0..."
//! }
//! ```

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Where a request came from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            ip_address: extract_ip_address(headers),
            user_agent: extract_user_agent(headers),
        }
    }
}

/// Security audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    LoginSuccess {
        user_id: i64,
        email: String,
        #[serde(flatten)]
        client: ClientInfo,
    },

    /// Failed login; `reason` is never shown to the caller
    LoginFailure {
        email: String,
        reason: String,
        #[serde(flatten)]
        client: ClientInfo,
    },

    Logout {
        user_id: i64,
        session_id: i64,
        #[serde(flatten)]
        client: ClientInfo,
    },

    TokenRefresh {
        user_id: i64,
        session_id: i64,
        #[serde(flatten)]
        client: ClientInfo,
    },

    TokenRevoked {
        session_id: i64,
        #[serde(flatten)]
        client: ClientInfo,
    },

    RegistrationSuccess {
        user_id: i64,
        email: String,
        role: String,
        #[serde(flatten)]
        client: ClientInfo,
    },

    RegistrationFailure {
        email: String,
        reason: String,
        #[serde(flatten)]
        client: ClientInfo,
    },

    /// Caller authenticated but lacks the required role
    AccessDenied {
        user_id: Option<i64>,
        operation: String,
        required_role: String,
        #[serde(flatten)]
        client: ClientInfo,
    },

    /// Invalid or expired token presented to a protected operation
    InvalidToken {
        operation: String,
        reason: String,
        #[serde(flatten)]
        client: ClientInfo,
    },

    RoleChanged {
        user_id: i64,
        role: String,
        changed_by: Option<i64>,
        #[serde(flatten)]
        client: ClientInfo,
    },

    PreRegisteredUserAdded {
        email: String,
        added_by: Option<i64>,
        #[serde(flatten)]
        client: ClientInfo,
    },
}

impl AuditEvent {
    fn message(&self) -> &'static str {
        match self {
            AuditEvent::LoginSuccess { .. } => "Login successful",
            AuditEvent::LoginFailure { .. } => "Login failed",
            AuditEvent::Logout { .. } => "User logout",
            AuditEvent::TokenRefresh { .. } => "Token refresh",
            AuditEvent::TokenRevoked { .. } => "Refresh token revoked",
            AuditEvent::RegistrationSuccess { .. } => "Registration successful",
            AuditEvent::RegistrationFailure { .. } => "Registration failed",
            AuditEvent::AccessDenied { .. } => "Access denied",
            AuditEvent::InvalidToken { .. } => "Invalid token",
            AuditEvent::RoleChanged { .. } => "User role changed",
            AuditEvent::PreRegisteredUserAdded { .. } => "Pre-registered user added",
        }
    }

    fn client(&self) -> &ClientInfo {
        match self {
            AuditEvent::LoginSuccess { client, .. }
            | AuditEvent::LoginFailure { client, .. }
            | AuditEvent::Logout { client, .. }
            | AuditEvent::TokenRefresh { client, .. }
            | AuditEvent::TokenRevoked { client, .. }
            | AuditEvent::RegistrationSuccess { client, .. }
            | AuditEvent::RegistrationFailure { client, .. }
            | AuditEvent::AccessDenied { client, .. }
            | AuditEvent::InvalidToken { client, .. }
            | AuditEvent::RoleChanged { client, .. }
            | AuditEvent::PreRegisteredUserAdded { client, .. } => client,
        }
    }
}

/// Log a security audit event on the `audit` target
pub fn audit_log(event: &AuditEvent) {
    let timestamp = chrono::Utc::now();

    let event_json = serde_json::to_string(event)
        .unwrap_or_else(|e| format!("{{\"error\":\"Failed to serialize audit event: {e}\"}}"));

    let client = event.client();
    info!(
        target: "audit",
        timestamp = %timestamp,
        event = %event_json,
        ip_address = ?client.ip_address,
        user_agent = ?client.user_agent,
        "{}",
        event.message()
    );
}

/// Extract the client IP from proxy headers
///
/// Checks X-Forwarded-For (first hop), then X-Real-IP.
pub fn extract_ip_address(headers: &HeaderMap) -> Option<String> {
    if let Some(xff) = headers.get("x-forwarded-for") {
        if let Ok(xff_str) = xff.to_str() {
            if let Some(first_ip) = xff_str.split(',').next() {
                let first_ip = first_ip.trim();
                if !first_ip.is_empty() {
                    return Some(first_ip.to_string());
                }
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            return Some(ip_str.to_string());
        }
    }

    None
}

pub fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|ua| ua.to_str().ok())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_audit_event_serialization() {
        let event = AuditEvent::LoginSuccess {
            user_id: 42,
            email: "ana@x.com".to_string(),
            client: ClientInfo {
                ip_address: Some("192.168.1.1".to_string()),
                user_agent: None,
            },
        };

        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "login_success");
        assert_eq!(json["user_id"], 42);
        assert_eq!(json["ip_address"], "192.168.1.1");
    }

    #[test]
    fn test_access_denied_serialization() {
        let event = AuditEvent::AccessDenied {
            user_id: Some(7),
            operation: "listUsers".to_string(),
            required_role: "ADMIN".to_string(),
            client: ClientInfo::default(),
        };

        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "access_denied");
        assert_eq!(json["operation"], "listUsers");
        assert_eq!(json["required_role"], "ADMIN");
    }

    #[test]
    fn test_audit_log_does_not_panic() {
        audit_log(&AuditEvent::InvalidToken {
            operation: "me".to_string(),
            reason: "Token has expired".to_string(),
            client: ClientInfo::default(),
        });
        audit_log(&AuditEvent::RoleChanged {
            user_id: 1,
            role: "ADMIN".to_string(),
            changed_by: Some(2),
            client: ClientInfo::default(),
        });
    }

    #[test]
    fn test_extract_ip_from_x_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));

        assert_eq!(extract_ip_address(&headers), Some("203.0.113.7".to_string()));
    }

    #[test]
    fn test_extract_ip_from_x_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));

        assert_eq!(extract_ip_address(&headers), Some("10.0.0.2".to_string()));
    }

    #[test]
    fn test_client_info_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::USER_AGENT,
            HeaderValue::from_static("curl/8.0"),
        );

        let client = ClientInfo::from_headers(&headers);
        assert_eq!(client.ip_address, None);
        assert_eq!(client.user_agent, Some("curl/8.0".to_string()));
    }
}
