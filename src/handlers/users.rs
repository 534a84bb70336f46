use super::common::{
    created_response, no_content_response, page_window, success_response, validate_input, JsonBody,
    PathParam, QueryParams,
};
use crate::{
    auth::AuthUser,
    common::{not_blank, PageParams},
    entities::UserRole,
    errors::ApiError,
    handlers::AppState,
    services::users::{AdminUserUpdate, NewUser, UserFilter},
};
use axum::{extract::State, response::Response};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Staff account created from the back office
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 100), custom = "not_blank")]
    pub name: String,
    #[validate(email)]
    pub email: String,
    pub password: String,
    pub role: UserRole,
}

pub async fn list_users(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<PageParams>,
    QueryParams(filter): QueryParams<UserFilter>,
) -> Result<Response, ApiError> {
    let (page, per_page) = page_window(&state, &params);
    let users = state.services.users.list(filter, page, per_page).await?;
    Ok(success_response(users))
}

pub async fn get_user(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<Response, ApiError> {
    Ok(success_response(state.services.users.get(id).await?))
}

pub async fn create_user(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateUserRequest>,
) -> Result<Response, ApiError> {
    validate_input(&payload)?;
    let created = state
        .services
        .users
        .create(NewUser {
            name: payload.name,
            email: payload.email,
            password: payload.password,
            role: payload.role,
        })
        .await?;
    Ok(created_response(created))
}

pub async fn update_user(
    State(state): State<AppState>,
    admin: AuthUser,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<AdminUserUpdate>,
) -> Result<Response, ApiError> {
    let updated = state
        .services
        .users
        .update(admin.user_id, id, payload)
        .await?;
    Ok(success_response(updated))
}

pub async fn delete_user(
    State(state): State<AppState>,
    admin: AuthUser,
    PathParam(id): PathParam<Uuid>,
) -> Result<Response, ApiError> {
    state.services.users.delete(admin.user_id, id).await?;
    Ok(no_content_response())
}
