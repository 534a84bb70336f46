use super::common::success_response;
use crate::{auth::AuthUser, errors::ApiError, handlers::AppState};
use axum::{extract::State, response::Response};

#[utoipa::path(
    get,
    path = "/api/v1/admin/dashboard",
    tag = "Dashboards",
    summary = "Admin dashboard",
    responses(
        (status = 200, description = "Dashboard figures"),
        (status = 401, description = "Not signed in", body = crate::errors::ErrorResponse),
        (status = 403, description = "Wrong role", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn admin_dashboard(State(state): State<AppState>) -> Result<Response, ApiError> {
    Ok(success_response(state.services.dashboard.admin().await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/dashboard/customer",
    tag = "Dashboards",
    summary = "Customer dashboard",
    responses(
        (status = 200, description = "Dashboard figures"),
        (status = 401, description = "Not signed in", body = crate::errors::ErrorResponse),
        (status = 403, description = "Wrong role", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn customer_dashboard(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, ApiError> {
    Ok(success_response(
        state.services.dashboard.customer(user.user_id).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/dashboard/delivery",
    tag = "Dashboards",
    summary = "Delivery dashboard",
    responses(
        (status = 200, description = "Dashboard figures"),
        (status = 401, description = "Not signed in", body = crate::errors::ErrorResponse),
        (status = 403, description = "Wrong role", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delivery_dashboard(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, ApiError> {
    Ok(success_response(
        state.services.dashboard.delivery(user.user_id).await?,
    ))
}

pub async fn ambassador_dashboard(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, ApiError> {
    Ok(success_response(
        state.services.dashboard.ambassador(user.user_id).await?,
    ))
}
