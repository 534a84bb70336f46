use super::common::{created_response, message_response, success_response, validate_input, JsonBody};
use crate::{
    auth::{AccessToken, AuthUser},
    entities::user,
    errors::{ApiError, ServiceError},
    handlers::AppState,
    services::accounts::RegisterInput,
};
use axum::{extract::State, http::HeaderMap, response::Response};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Header carrying the anonymous cart token
pub const CART_SESSION_HEADER: &str = "x-cart-session";

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ForgotPasswordRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    #[serde(flatten)]
    pub token: AccessToken,
    pub user: user::Model,
    /// Guest cart lines moved onto the account
    pub merged_cart_lines: u64,
}

pub(crate) fn cart_session(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(CART_SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Merging is best-effort: a bad guest token must not block sign-in
async fn merge_guest_cart(state: &AppState, headers: &HeaderMap, user_id: Uuid) -> u64 {
    let Some(token) = cart_session(headers) else {
        return 0;
    };
    match state.services.cart.merge_guest_into_user(token, user_id).await {
        Ok(merged) => merged,
        Err(err) => {
            warn!(%user_id, error = %err, "could not merge guest cart");
            0
        }
    }
}

fn issue_session(state: &AppState, account: &user::Model) -> Result<AccessToken, ApiError> {
    state
        .auth
        .generate_token(account)
        .map_err(|e| ApiError::ServiceError(ServiceError::InternalError(e.to_string())))
}

/// Create a customer account and sign it in
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    tag = "Auth",
    summary = "Register a customer account",
    request_body = RegisterInput,
    responses(
        (status = 201, description = "Account created and signed in"),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse),
        (status = 409, description = "Conflict", body = crate::errors::ErrorResponse),
    )
)]
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(payload): JsonBody<RegisterInput>,
) -> Result<Response, ApiError> {
    validate_input(&payload)?;
    let account = state.services.accounts.register(payload).await?;
    let token = issue_session(&state, &account)?;
    let merged_cart_lines = merge_guest_cart(&state, &headers, account.id).await;

    Ok(created_response(SessionResponse {
        token,
        user: account,
        merged_cart_lines,
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "Auth",
    summary = "Sign in",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in"),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse),
        (status = 401, description = "Not signed in", body = crate::errors::ErrorResponse),
        (status = 403, description = "Wrong role", body = crate::errors::ErrorResponse),
    )
)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> Result<Response, ApiError> {
    validate_input(&payload)?;
    let account = state
        .services
        .accounts
        .authenticate(&payload.email, &payload.password)
        .await?;
    let token = issue_session(&state, &account)?;
    let merged_cart_lines = merge_guest_cart(&state, &headers, account.id).await;

    info!(user_id = %account.id, role = %account.role, "user signed in");
    Ok(success_response(SessionResponse {
        token,
        user: account,
        merged_cart_lines,
    }))
}

/// Revokes the presented token
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    tag = "Auth",
    summary = "Revoke the current token",
    responses(
        (status = 200, description = "Signed out"),
        (status = 401, description = "Not signed in", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn logout(State(state): State<AppState>, user: AuthUser) -> Result<Response, ApiError> {
    state.auth.revoke(&user).await;
    Ok(message_response("Signed out"))
}

/// Always answers the same way whether or not the email is known.
/// In development the raw token is returned so the flow can be exercised without email.
#[utoipa::path(
    post,
    path = "/api/v1/auth/password/forgot",
    tag = "Auth",
    summary = "Request a password reset",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset requested"),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse),
    )
)]
pub async fn forgot_password(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<ForgotPasswordRequest>,
) -> Result<Response, ApiError> {
    validate_input(&payload)?;
    let issued = state.services.accounts.request_reset(&payload.email).await?;

    match issued {
        Some(issued) if state.config.is_development() => Ok(success_response(issued)),
        _ => Ok(message_response(
            "If the address belongs to an account, a reset link has been sent",
        )),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/password/reset",
    tag = "Auth",
    summary = "Complete a password reset",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset"),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse),
    )
)]
pub async fn reset_password(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<ResetPasswordRequest>,
) -> Result<Response, ApiError> {
    state
        .services
        .accounts
        .complete_reset(&payload.token, &payload.new_password)
        .await?;
    Ok(message_response("Password has been reset"))
}
