use super::common::{
    created_response, page_window, success_response, validate_input, JsonBody, PathParam,
    QueryParams,
};
use crate::{
    auth::AuthUser,
    common::PageParams,
    entities::OrderStatus,
    errors::ApiError,
    handlers::AppState,
    services::orders::{CheckoutDetails, OrderFilter},
};
use axum::{extract::State, response::Response};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignDeliveryRequest {
    pub delivery_person_id: Uuid,
}

// ---- customer ----

#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    tag = "Orders",
    summary = "Place an order from the cart",
    request_body = CheckoutDetails,
    responses(
        (status = 201, description = "Order placed"),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse),
        (status = 401, description = "Not signed in", body = crate::errors::ErrorResponse),
        (status = 403, description = "Wrong role", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn checkout(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(payload): JsonBody<CheckoutDetails>,
) -> Result<Response, ApiError> {
    validate_input(&payload)?;
    let order = state.services.orders.checkout(user.user_id, payload).await?;
    Ok(created_response(order))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders",
    tag = "Orders",
    summary = "List the caller's orders",
    params(PageParams),
    responses(
        (status = 200, description = "Page of orders"),
        (status = 401, description = "Not signed in", body = crate::errors::ErrorResponse),
        (status = 403, description = "Wrong role", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_my_orders(
    State(state): State<AppState>,
    user: AuthUser,
    QueryParams(params): QueryParams<PageParams>,
) -> Result<Response, ApiError> {
    let (page, per_page) = page_window(&state, &params);
    let orders = state
        .services
        .orders
        .list_for_customer(user.user_id, page, per_page)
        .await?;
    Ok(success_response(orders))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    tag = "Orders",
    summary = "Get one of the caller's orders",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with items"),
        (status = 401, description = "Not signed in", body = crate::errors::ErrorResponse),
        (status = 403, description = "Wrong role", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_my_order(
    State(state): State<AppState>,
    user: AuthUser,
    PathParam(id): PathParam<Uuid>,
) -> Result<Response, ApiError> {
    let order = state
        .services
        .orders
        .get_for_customer(user.user_id, id)
        .await?;
    Ok(success_response(order))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/cancel",
    tag = "Orders",
    summary = "Cancel a pending order",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order cancelled"),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse),
        (status = 401, description = "Not signed in", body = crate::errors::ErrorResponse),
        (status = 403, description = "Wrong role", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn cancel_my_order(
    State(state): State<AppState>,
    user: AuthUser,
    PathParam(id): PathParam<Uuid>,
) -> Result<Response, ApiError> {
    let order = state
        .services
        .orders
        .cancel_by_customer(user.user_id, id)
        .await?;
    Ok(success_response(order))
}

// ---- admin ----

pub async fn admin_list_orders(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<PageParams>,
    QueryParams(filter): QueryParams<OrderFilter>,
) -> Result<Response, ApiError> {
    let (page, per_page) = page_window(&state, &params);
    let orders = state.services.orders.list(filter, page, per_page).await?;
    Ok(success_response(orders))
}

pub async fn admin_get_order(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<Response, ApiError> {
    Ok(success_response(state.services.orders.get(id).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/orders/{id}/status",
    tag = "Admin",
    summary = "Move an order to a new status",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Order updated"),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse),
        (status = 401, description = "Not signed in", body = crate::errors::ErrorResponse),
        (status = 403, description = "Wrong role", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Conflict", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn admin_update_status(
    State(state): State<AppState>,
    admin: AuthUser,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<UpdateStatusRequest>,
) -> Result<Response, ApiError> {
    let order = state
        .services
        .orders
        .update_status(id, payload.status, admin.user_id)
        .await?;
    Ok(success_response(order))
}

pub async fn admin_assign_delivery(
    State(state): State<AppState>,
    admin: AuthUser,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<AssignDeliveryRequest>,
) -> Result<Response, ApiError> {
    let order = state
        .services
        .orders
        .assign_delivery(id, payload.delivery_person_id, admin.user_id)
        .await?;
    Ok(success_response(order))
}

// ---- delivery ----

pub async fn list_assigned(
    State(state): State<AppState>,
    driver: AuthUser,
    QueryParams(params): QueryParams<PageParams>,
) -> Result<Response, ApiError> {
    let (page, per_page) = page_window(&state, &params);
    let orders = state
        .services
        .orders
        .list_assigned(driver.user_id, page, per_page)
        .await?;
    Ok(success_response(orders))
}

pub async fn start_delivery(
    State(state): State<AppState>,
    driver: AuthUser,
    PathParam(id): PathParam<Uuid>,
) -> Result<Response, ApiError> {
    let order = state
        .services
        .orders
        .start_delivery(driver.user_id, id)
        .await?;
    Ok(success_response(order))
}

pub async fn complete_delivery(
    State(state): State<AppState>,
    driver: AuthUser,
    PathParam(id): PathParam<Uuid>,
) -> Result<Response, ApiError> {
    let order = state
        .services
        .orders
        .complete_delivery(driver.user_id, id)
        .await?;
    Ok(success_response(order))
}
