//! Refresh endpoint: rotates a refresh token, retiring the presented one.
//!
//! Every rejection is the same 401 regardless of cause. A replayed token
//! already triggers lineage revocation inside the token service; nothing in
//! the response may reveal that this happened.

use axum::{Json, extract::Extension, http::HeaderMap, http::StatusCode, response::IntoResponse};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use super::state::AuthState;
use super::types::{RefreshRequest, TokenPairResponse};
use super::utils::{INVALID_REFRESH_TOKEN, client_info, error_response, token_pair_response};
use crate::token::{TokenError, compose_refresh_token, generate_secret, parse_refresh_token};

#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Token pair rotated", body = TokenPairResponse),
        (status = 400, description = "Validation error", body = super::types::ErrorResponse),
        (status = 401, description = "Invalid refresh token", body = super::types::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn refresh(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RefreshRequest>>,
) -> impl IntoResponse {
    let request: RefreshRequest = match payload {
        Some(Json(payload)) => payload,
        None => return error_response(StatusCode::BAD_REQUEST, "Missing payload"),
    };

    let Some((jti, secret)) = parse_refresh_token(&request.refresh_token) else {
        return error_response(StatusCode::UNAUTHORIZED, INVALID_REFRESH_TOKEN);
    };

    let new_secret = match generate_secret() {
        Ok(secret) => secret,
        Err(err) => {
            error!("Failed to generate token secret: {err}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error");
        }
    };

    let rotated = auth_state
        .tokens()
        .rotate(
            jti,
            secret,
            Uuid::new_v4(),
            &new_secret,
            auth_state.config().refresh_token_ttl_seconds(),
            &client_info(&headers),
        )
        .await;

    match rotated {
        Ok(record) => match generate_secret() {
            Ok(access_token) => token_pair_response(
                StatusCode::OK,
                TokenPairResponse {
                    access_token,
                    refresh_token: compose_refresh_token(record.jti, &new_secret),
                    token_type: "Bearer".to_string(),
                    expires_in: auth_state.config().access_token_ttl_seconds(),
                },
            ),
            Err(err) => {
                error!("Failed to generate access token: {err}");
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
            }
        },
        Err(TokenError::Store(err)) => {
            error!("Failed to rotate token: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
        Err(_) => error_response(StatusCode::UNAUTHORIZED, INVALID_REFRESH_TOKEN),
    }
}
