//! Login endpoint: verifies credentials and mints the first token pair of
//! a new session lineage.

use axum::{Json, extract::Extension, http::HeaderMap, http::StatusCode, response::IntoResponse};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use super::state::AuthState;
use super::types::{LoginRequest, TokenPairResponse};
use super::utils::{client_info, error_response, normalize_email, token_pair_response};
use crate::token::{StoreError, TokenError, compose_refresh_token, generate_secret};

/// Retries on the off chance a freshly minted token id collides with a
/// stored one.
const MAX_ISSUE_ATTEMPTS: usize = 3;

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token pair issued", body = TokenPairResponse),
        (status = 400, description = "Validation error", body = super::types::ErrorResponse),
        (status = 401, description = "Invalid credentials", body = super::types::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => return error_response(StatusCode::BAD_REQUEST, "Missing payload"),
    };

    let email_normalized = normalize_email(&request.email);

    let user = match auth_state
        .directory()
        .verify_credentials(&email_normalized, &request.password)
        .await
    {
        Ok(Some(user)) => user,
        Ok(None) => return error_response(StatusCode::UNAUTHORIZED, "Invalid credentials"),
        Err(err) => {
            error!("Failed to verify credentials: {err}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error");
        }
    };

    // A login starts a fresh lineage; every later rotation stays inside it.
    match issue_token_pair(&auth_state, user.id, Uuid::new_v4(), &headers).await {
        Ok(pair) => token_pair_response(StatusCode::OK, pair),
        Err(err) => {
            error!("Failed to issue token pair: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}

pub(super) async fn issue_token_pair(
    auth_state: &AuthState,
    user_id: Uuid,
    lineage_id: Uuid,
    headers: &HeaderMap,
) -> Result<TokenPairResponse, TokenError> {
    let client = client_info(headers);
    let refresh_ttl = auth_state.config().refresh_token_ttl_seconds();
    let access_ttl = auth_state.config().access_token_ttl_seconds();

    for _ in 0..MAX_ISSUE_ATTEMPTS {
        let jti = Uuid::new_v4();
        let secret =
            generate_secret().map_err(|err| TokenError::Store(StoreError::Backend(err)))?;
        match auth_state
            .tokens()
            .issue(user_id, jti, lineage_id, &secret, refresh_ttl, &client)
            .await
        {
            Ok(record) => {
                let access_token =
                    generate_secret().map_err(|err| TokenError::Store(StoreError::Backend(err)))?;
                return Ok(TokenPairResponse {
                    access_token,
                    refresh_token: compose_refresh_token(record.jti, &secret),
                    token_type: "Bearer".to_string(),
                    expires_in: access_ttl,
                });
            }
            // Token id collision, mint a fresh one and retry.
            Err(TokenError::Store(StoreError::Duplicate)) => {}
            Err(err) => return Err(err),
        }
    }

    Err(TokenError::Store(StoreError::Backend(anyhow::anyhow!(
        "exhausted {MAX_ISSUE_ATTEMPTS} token id attempts"
    ))))
}

#[cfg(test)]
mod tests {
    use super::super::testing::auth_state;
    use super::*;
    use axum::body::to_bytes;
    use axum::http::header::CACHE_CONTROL;

    #[tokio::test]
    async fn login_missing_payload() {
        let response = login(HeaderMap::new(), Extension(auth_state()), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn login_rejects_unknown_user_and_wrong_password() {
        let state = auth_state();
        state
            .directory()
            .create("alice@example.com", "correct horse")
            .await
            .unwrap();

        let response = login(
            HeaderMap::new(),
            Extension(state.clone()),
            Some(Json(LoginRequest {
                email: "nobody@example.com".to_string(),
                password: "correct horse".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = login(
            HeaderMap::new(),
            Extension(state),
            Some(Json(LoginRequest {
                email: "alice@example.com".to_string(),
                password: "wrong horse".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_returns_uncacheable_bearer_pair() {
        let state = auth_state();
        state
            .directory()
            .create("alice@example.com", "correct horse")
            .await
            .unwrap();

        let response = login(
            HeaderMap::new(),
            Extension(state),
            Some(Json(LoginRequest {
                email: " Alice@Example.COM ".to_string(),
                password: "correct horse".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(CACHE_CONTROL)
                .and_then(|value| value.to_str().ok()),
            Some("no-store")
        );

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let pair: TokenPairResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(pair.token_type, "Bearer");
        assert!(pair.expires_in > 0);
        assert!(pair.refresh_token.contains('.'));
        assert!(!pair.access_token.is_empty());
    }
}
