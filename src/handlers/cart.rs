use super::{
    auth::{cart_session, CART_SESSION_HEADER},
    common::{created_response, no_content_response, success_response, JsonBody, PathParam},
};
use crate::{
    auth::AuthUser,
    errors::{ApiError, ServiceError},
    handlers::AppState,
    services::cart::CartOwner,
};
use axum::{extract::State, http::HeaderMap, response::Response};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddCartItemRequest {
    pub menu_item_id: Uuid,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCartItemRequest {
    pub quantity: i32,
}

/// Signed-in callers use their account cart; anonymous callers need a session token
fn resolve_owner(user: Option<AuthUser>, headers: &HeaderMap) -> Result<CartOwner, ApiError> {
    if let Some(user) = user {
        return Ok(CartOwner::User(user.user_id));
    }
    match cart_session(headers) {
        Some(token) => Ok(CartOwner::guest(token)?),
        None => Err(ServiceError::ValidationError(format!(
            "Sign in or send an {} header to use a cart",
            CART_SESSION_HEADER
        ))
        .into()),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/cart",
    tag = "Cart",
    summary = "View the cart",
    responses(
        (status = 200, description = "Cart lines and subtotal"),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn view_cart(
    State(state): State<AppState>,
    user: Option<AuthUser>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let owner = resolve_owner(user, &headers)?;
    Ok(success_response(state.services.cart.view(&owner).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/cart/count",
    tag = "Cart",
    summary = "Total quantity in the cart",
    responses(
        (status = 200, description = "Item count"),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn cart_count(
    State(state): State<AppState>,
    user: Option<AuthUser>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let owner = resolve_owner(user, &headers)?;
    let count = state.services.cart.count(&owner).await?;
    Ok(success_response(json!({ "count": count })))
}

#[utoipa::path(
    post,
    path = "/api/v1/cart/items",
    tag = "Cart",
    summary = "Add an item to the cart",
    request_body = AddCartItemRequest,
    responses(
        (status = 201, description = "Cart line saved"),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn add_item(
    State(state): State<AppState>,
    user: Option<AuthUser>,
    headers: HeaderMap,
    JsonBody(payload): JsonBody<AddCartItemRequest>,
) -> Result<Response, ApiError> {
    let owner = resolve_owner(user, &headers)?;
    let line = state
        .services
        .cart
        .add_item(&owner, payload.menu_item_id, payload.quantity)
        .await?;
    Ok(created_response(line))
}

/// A quantity of zero or less removes the line
pub async fn update_item(
    State(state): State<AppState>,
    user: Option<AuthUser>,
    headers: HeaderMap,
    PathParam(line_id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<UpdateCartItemRequest>,
) -> Result<Response, ApiError> {
    let owner = resolve_owner(user, &headers)?;
    let line = state
        .services
        .cart
        .update_quantity(&owner, line_id, payload.quantity)
        .await?;
    Ok(success_response(json!({ "removed": line.is_none(), "line": line })))
}

pub async fn remove_item(
    State(state): State<AppState>,
    user: Option<AuthUser>,
    headers: HeaderMap,
    PathParam(line_id): PathParam<Uuid>,
) -> Result<Response, ApiError> {
    let owner = resolve_owner(user, &headers)?;
    state.services.cart.remove_item(&owner, line_id).await?;
    Ok(no_content_response())
}

pub async fn clear_cart(
    State(state): State<AppState>,
    user: Option<AuthUser>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let owner = resolve_owner(user, &headers)?;
    let removed = state.services.cart.clear(&owner).await?;
    Ok(success_response(json!({ "removed": removed })))
}
