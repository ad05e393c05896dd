//! Account registration endpoint.

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use std::sync::Arc;
use tracing::error;

use super::state::AuthState;
use super::types::{RegisterRequest, RegisterResponse};
use super::utils::{error_response, normalize_email, valid_email, valid_password};
use crate::directory::DirectoryError;

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = RegisterResponse),
        (status = 400, description = "Validation error", body = super::types::ErrorResponse),
        (status = 409, description = "Email already registered", body = super::types::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn register(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let request: RegisterRequest = match payload {
        Some(Json(payload)) => payload,
        None => return error_response(StatusCode::BAD_REQUEST, "Missing payload"),
    };

    let email_normalized = normalize_email(&request.email);
    if !valid_email(&email_normalized) {
        return error_response(StatusCode::BAD_REQUEST, "Invalid email");
    }

    if !valid_password(&request.password) {
        return error_response(StatusCode::BAD_REQUEST, "Password too short");
    }

    match auth_state
        .directory()
        .create(&email_normalized, &request.password)
        .await
    {
        Ok(user) => (
            StatusCode::CREATED,
            Json(RegisterResponse {
                user_id: user.id.to_string(),
                email: user.email,
            }),
        )
            .into_response(),
        Err(DirectoryError::DuplicateEmail) => {
            error_response(StatusCode::CONFLICT, "Email already registered")
        }
        Err(err) => {
            error!("Failed to create user: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}
