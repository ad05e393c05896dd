//! Active-session listing for the authenticated user.

use axum::{Json, extract::Extension, http::HeaderMap, http::StatusCode, response::IntoResponse};
use std::sync::Arc;
use tracing::error;

use super::state::AuthState;
use super::types::{SessionView, SessionsResponse};
use super::utils::{INVALID_REFRESH_TOKEN, bearer_token, error_response};
use crate::token::{RefreshTokenRecord, TokenError, parse_refresh_token};
use uuid::Uuid;

#[utoipa::path(
    get,
    path = "/v1/auth/sessions",
    responses(
        (status = 200, description = "Active sessions, newest first", body = SessionsResponse),
        (status = 401, description = "Invalid refresh token", body = super::types::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn sessions(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let Some(presented) = bearer_token(&headers) else {
        return error_response(StatusCode::UNAUTHORIZED, INVALID_REFRESH_TOKEN);
    };
    let Some((jti, secret)) = parse_refresh_token(&presented) else {
        return error_response(StatusCode::UNAUTHORIZED, INVALID_REFRESH_TOKEN);
    };

    let record = match auth_state.tokens().validate(jti, secret).await {
        Ok(record) => record,
        Err(TokenError::Store(err)) => {
            error!("Failed to validate token: {err}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error");
        }
        Err(_) => return error_response(StatusCode::UNAUTHORIZED, INVALID_REFRESH_TOKEN),
    };

    let active = match auth_state.tokens().list_active(record.user_id).await {
        Ok(active) => active,
        Err(err) => {
            error!("Failed to list sessions: {err}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error");
        }
    };
    let total = match auth_state.tokens().count_active(record.user_id).await {
        Ok(total) => total,
        Err(err) => {
            error!("Failed to count sessions: {err}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error");
        }
    };

    let sessions = active
        .iter()
        .map(|session| session_view(session, jti))
        .collect();
    (StatusCode::OK, Json(SessionsResponse { sessions, total })).into_response()
}

fn session_view(record: &RefreshTokenRecord, presented_jti: Uuid) -> SessionView {
    SessionView {
        jti: record.jti.to_string(),
        issued_at: record.issued_at.to_rfc3339(),
        expires_at: record.expires_at.to_rfc3339(),
        last_used_at: record.last_used_at.map(|at| at.to_rfc3339()),
        ip_address: record.ip_address.map(|ip| ip.to_string()),
        user_agent: record.user_agent.clone(),
        current: record.jti == presented_jti,
    }
}
