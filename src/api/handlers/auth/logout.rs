//! Logout endpoints: revoke one session or every session of a user.

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use std::sync::Arc;
use tracing::error;

use super::state::AuthState;
use super::types::LogoutRequest;
use super::utils::{INVALID_REFRESH_TOKEN, error_response};
use crate::token::{TokenError, parse_refresh_token};

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    request_body = LogoutRequest,
    responses(
        (status = 204, description = "Session ended"),
        (status = 400, description = "Validation error", body = super::types::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn logout(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LogoutRequest>>,
) -> impl IntoResponse {
    let request: LogoutRequest = match payload {
        Some(Json(payload)) => payload,
        None => return error_response(StatusCode::BAD_REQUEST, "Missing payload"),
    };

    // Logout is idempotent: a bad token gets the same 204 as a live one, so
    // nothing is learned by probing it. Replay side effects still run inside
    // validate.
    let Some((jti, secret)) = parse_refresh_token(&request.refresh_token) else {
        return StatusCode::NO_CONTENT.into_response();
    };

    match auth_state.tokens().validate(jti, secret).await {
        Ok(record) => {
            if let Err(err) = auth_state.tokens().revoke(record.jti).await {
                error!("Failed to revoke token: {err}");
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error");
            }
            StatusCode::NO_CONTENT.into_response()
        }
        Err(TokenError::Store(err)) => {
            error!("Failed to validate token: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
        Err(_) => StatusCode::NO_CONTENT.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout-all",
    request_body = LogoutRequest,
    responses(
        (status = 204, description = "All sessions ended"),
        (status = 400, description = "Validation error", body = super::types::ErrorResponse),
        (status = 401, description = "Invalid refresh token", body = super::types::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn logout_all(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LogoutRequest>>,
) -> impl IntoResponse {
    let request: LogoutRequest = match payload {
        Some(Json(payload)) => payload,
        None => return error_response(StatusCode::BAD_REQUEST, "Missing payload"),
    };

    // Revoking every session needs proof of possession, so unlike single
    // logout an invalid token is refused.
    let Some((jti, secret)) = parse_refresh_token(&request.refresh_token) else {
        return error_response(StatusCode::UNAUTHORIZED, INVALID_REFRESH_TOKEN);
    };

    match auth_state.tokens().validate(jti, secret).await {
        Ok(record) => {
            match auth_state.tokens().revoke_all_for_user(record.user_id).await {
                Ok(_) => StatusCode::NO_CONTENT.into_response(),
                Err(err) => {
                    error!("Failed to revoke user sessions: {err}");
                    error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
                }
            }
        }
        Err(TokenError::Store(err)) => {
            error!("Failed to validate token: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
        Err(_) => error_response(StatusCode::UNAUTHORIZED, INVALID_REFRESH_TOKEN),
    }
}
