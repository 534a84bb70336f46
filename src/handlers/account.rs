use super::common::{message_response, success_response, validate_input, JsonBody};
use crate::{
    auth::AuthUser, errors::ApiError, handlers::AppState, services::accounts::ProfileUpdate,
};
use axum::{extract::State, response::Response};
use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct NewsletterPreference {
    pub opt_in: bool,
}

pub async fn get_me(State(state): State<AppState>, user: AuthUser) -> Result<Response, ApiError> {
    let profile = state.services.accounts.get_profile(user.user_id).await?;
    Ok(success_response(profile))
}

pub async fn update_me(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(payload): JsonBody<ProfileUpdate>,
) -> Result<Response, ApiError> {
    validate_input(&payload)?;
    let profile = state
        .services
        .accounts
        .update_profile(user.user_id, payload)
        .await?;
    Ok(success_response(profile))
}

pub async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(payload): JsonBody<ChangePasswordRequest>,
) -> Result<Response, ApiError> {
    state
        .services
        .accounts
        .change_password(user.user_id, &payload.current_password, &payload.new_password)
        .await?;
    Ok(message_response("Password changed"))
}

pub async fn set_newsletter(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(payload): JsonBody<NewsletterPreference>,
) -> Result<Response, ApiError> {
    let profile = state
        .services
        .accounts
        .set_newsletter_opt_in(user.user_id, payload.opt_in)
        .await?;
    Ok(success_response(profile))
}
