use super::common::{
    created_response, no_content_response, page_window, success_response, JsonBody, PathParam,
    QueryParams,
};
use crate::{
    auth::AuthUser,
    common::PageParams,
    entities::CampaignStatus,
    errors::ApiError,
    handlers::AppState,
    services::newsletters::{CampaignInput, CampaignUpdate, TemplateInput, TemplateUpdate},
};
use axum::{extract::State, response::Response};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct CampaignQuery {
    pub status: Option<CampaignStatus>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ScheduleRequest {
    pub scheduled_at: DateTime<Utc>,
}

// ---- templates ----

pub async fn list_templates(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<PageParams>,
) -> Result<Response, ApiError> {
    let (page, per_page) = page_window(&state, &params);
    let templates = state
        .services
        .newsletters
        .list_templates(page, per_page)
        .await?;
    Ok(success_response(templates))
}

pub async fn get_template(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<Response, ApiError> {
    Ok(success_response(
        state.services.newsletters.get_template(id).await?,
    ))
}

pub async fn create_template(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<TemplateInput>,
) -> Result<Response, ApiError> {
    let template = state.services.newsletters.create_template(payload).await?;
    Ok(created_response(template))
}

pub async fn update_template(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<TemplateUpdate>,
) -> Result<Response, ApiError> {
    let template = state
        .services
        .newsletters
        .update_template(id, payload)
        .await?;
    Ok(success_response(template))
}

pub async fn delete_template(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<Response, ApiError> {
    state.services.newsletters.delete_template(id).await?;
    Ok(no_content_response())
}

// ---- campaigns ----

pub async fn list_campaigns(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<PageParams>,
    QueryParams(query): QueryParams<CampaignQuery>,
) -> Result<Response, ApiError> {
    let (page, per_page) = page_window(&state, &params);
    let campaigns = state
        .services
        .newsletters
        .list_campaigns(query.status, page, per_page)
        .await?;
    Ok(success_response(campaigns))
}

pub async fn get_campaign(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<Response, ApiError> {
    Ok(success_response(
        state.services.newsletters.get_campaign(id).await?,
    ))
}

pub async fn create_campaign(
    State(state): State<AppState>,
    admin: AuthUser,
    JsonBody(payload): JsonBody<CampaignInput>,
) -> Result<Response, ApiError> {
    let campaign = state
        .services
        .newsletters
        .create_campaign(payload, admin.user_id)
        .await?;
    Ok(created_response(campaign))
}

pub async fn update_campaign(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<CampaignUpdate>,
) -> Result<Response, ApiError> {
    let campaign = state
        .services
        .newsletters
        .update_campaign(id, payload)
        .await?;
    Ok(success_response(campaign))
}

pub async fn schedule_campaign(
    State(state): State<AppState>,
    admin: AuthUser,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<ScheduleRequest>,
) -> Result<Response, ApiError> {
    let campaign = state
        .services
        .newsletters
        .schedule(id, payload.scheduled_at, admin.user_id)
        .await?;
    Ok(success_response(campaign))
}

pub async fn send_campaign(
    State(state): State<AppState>,
    admin: AuthUser,
    PathParam(id): PathParam<Uuid>,
) -> Result<Response, ApiError> {
    let campaign = state
        .services
        .newsletters
        .send(id, admin.user_id)
        .await?;
    Ok(success_response(campaign))
}

pub async fn delete_campaign(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<Response, ApiError> {
    state.services.newsletters.delete_campaign(id).await?;
    Ok(no_content_response())
}
