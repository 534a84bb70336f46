use super::common::{page_window, success_response, QueryParams};
use crate::{
    common::PageParams, errors::ApiError, handlers::AppState, services::activity::ActivityFilter,
};
use axum::{extract::State, response::Response};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<u64>,
}

pub async fn list_activity(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<PageParams>,
    QueryParams(filter): QueryParams<ActivityFilter>,
) -> Result<Response, ApiError> {
    let (page, per_page) = page_window(&state, &params);
    let entries = state
        .services
        .activity
        .list(filter, page, per_page)
        .await?;
    Ok(success_response(entries))
}

/// Newest entries first, for dashboard widgets
#[utoipa::path(
    get,
    path = "/api/v1/admin/activity/recent",
    tag = "Admin",
    summary = "Most recent activity",
    params(("limit" = Option<u64>, Query, description = "1 to 100, default 10")),
    responses(
        (status = 200, description = "Newest entries first"),
        (status = 401, description = "Not signed in", body = crate::errors::ErrorResponse),
        (status = 403, description = "Wrong role", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn recent_activity(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<RecentQuery>,
) -> Result<Response, ApiError> {
    let entries = state
        .services
        .activity
        .recent(query.limit.unwrap_or(10))
        .await?;
    Ok(success_response(entries))
}
