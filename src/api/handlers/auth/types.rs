//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterResponse {
    pub user_id: String,
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Token pair returned by login and refresh. The refresh token is shown
/// exactly once; only a hash of its secret half is stored.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LogoutRequest {
    pub refresh_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionView {
    pub jti: String,
    pub issued_at: String,
    pub expires_at: String,
    pub last_used_at: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub current: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionView>,
    pub total: u64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    #[test]
    fn token_pair_response_round_trips() -> Result<()> {
        let pair = TokenPairResponse {
            access_token: "opaque-access".to_string(),
            refresh_token: "jti.secret".to_string(),
            token_type: "Bearer".to_string(),
            expires_in: 900,
        };
        let value = serde_json::to_value(&pair)?;
        let token_type = value
            .get("token_type")
            .and_then(serde_json::Value::as_str)
            .context("missing token_type")?;
        assert_eq!(token_type, "Bearer");
        let decoded: TokenPairResponse = serde_json::from_value(value)?;
        assert_eq!(decoded.expires_in, 900);
        Ok(())
    }

    #[test]
    fn session_view_keeps_optional_fields() -> Result<()> {
        let view = SessionView {
            jti: "0191d1f0-0000-7000-8000-000000000000".to_string(),
            issued_at: "2025-01-01T00:00:00+00:00".to_string(),
            expires_at: "2025-01-31T00:00:00+00:00".to_string(),
            last_used_at: None,
            ip_address: Some("203.0.113.7".to_string()),
            user_agent: None,
            current: true,
        };
        let value = serde_json::to_value(&view)?;
        let decoded: SessionView = serde_json::from_value(value)?;
        assert!(decoded.current);
        assert!(decoded.last_used_at.is_none());
        assert_eq!(decoded.ip_address.as_deref(), Some("203.0.113.7"));
        Ok(())
    }

    #[test]
    fn register_request_round_trips() -> Result<()> {
        let request = RegisterRequest {
            email: "alice@example.com".to_string(),
            password: "correct horse".to_string(),
        };
        let value = serde_json::to_value(&request)?;
        let decoded: RegisterRequest = serde_json::from_value(value)?;
        assert_eq!(decoded.email, "alice@example.com");
        Ok(())
    }
}
