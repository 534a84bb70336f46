use super::common::{
    created_response, no_content_response, page_window, success_response, JsonBody, PathParam,
    QueryParams,
};
use crate::{
    auth::AuthUser,
    common::PageParams,
    errors::ApiError,
    handlers::AppState,
    services::menu::{MenuFilter, MenuItemInput, MenuItemUpdate},
};
use axum::{extract::State, response::Response};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AvailabilityRequest {
    pub is_available: bool,
}

// ---- storefront ----

#[utoipa::path(
    get,
    path = "/api/v1/menu",
    tag = "Menu",
    summary = "List available menu items",
    params(PageParams),
    responses(
        (status = 200, description = "Page of menu items"),
    )
)]
pub async fn list_menu(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<PageParams>,
    QueryParams(filter): QueryParams<MenuFilter>,
) -> Result<Response, ApiError> {
    let (page, per_page) = page_window(&state, &params);
    let items = state.services.menu.list(filter, true, page, per_page).await?;
    Ok(success_response(items))
}

#[utoipa::path(
    get,
    path = "/api/v1/menu/categories",
    tag = "Menu",
    summary = "List menu categories",
    responses(
        (status = 200, description = "Category names"),
    )
)]
pub async fn list_categories(State(state): State<AppState>) -> Result<Response, ApiError> {
    let categories = state.services.menu.categories().await?;
    Ok(success_response(categories))
}

#[utoipa::path(
    get,
    path = "/api/v1/menu/{id}",
    tag = "Menu",
    summary = "Get a menu item",
    params(("id" = Uuid, Path, description = "Menu item id")),
    responses(
        (status = 200, description = "Menu item"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
    )
)]
pub async fn get_menu_item(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<Response, ApiError> {
    let item = state.services.menu.get_available(id).await?;
    Ok(success_response(item))
}

// ---- admin ----

pub async fn admin_list_menu(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<PageParams>,
    QueryParams(filter): QueryParams<MenuFilter>,
) -> Result<Response, ApiError> {
    let (page, per_page) = page_window(&state, &params);
    let items = state.services.menu.list(filter, false, page, per_page).await?;
    Ok(success_response(items))
}

pub async fn admin_get_menu_item(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<Response, ApiError> {
    Ok(success_response(state.services.menu.get(id).await?))
}

pub async fn create_menu_item(
    State(state): State<AppState>,
    admin: AuthUser,
    JsonBody(payload): JsonBody<MenuItemInput>,
) -> Result<Response, ApiError> {
    let item = state.services.menu.create(payload, admin.user_id).await?;
    Ok(created_response(item))
}

pub async fn update_menu_item(
    State(state): State<AppState>,
    admin: AuthUser,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<MenuItemUpdate>,
) -> Result<Response, ApiError> {
    let item = state
        .services
        .menu
        .update(id, payload, admin.user_id)
        .await?;
    Ok(success_response(item))
}

pub async fn set_availability(
    State(state): State<AppState>,
    admin: AuthUser,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<AvailabilityRequest>,
) -> Result<Response, ApiError> {
    let item = state
        .services
        .menu
        .set_availability(id, payload.is_available, admin.user_id)
        .await?;
    Ok(success_response(item))
}

pub async fn delete_menu_item(
    State(state): State<AppState>,
    admin: AuthUser,
    PathParam(id): PathParam<Uuid>,
) -> Result<Response, ApiError> {
    state.services.menu.delete(id, admin.user_id).await?;
    Ok(no_content_response())
}
