use super::common::{created_response, success_response, JsonBody, PathParam, QueryParams};
use crate::{
    auth::AuthUser, entities::SenderRole, errors::ApiError, handlers::AppState,
    services::chat::MAX_POLL_LIMIT,
};
use axum::{extract::State, response::Response};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PollQuery {
    /// Only messages created strictly after this instant
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
}

impl PollQuery {
    fn limit(&self) -> u64 {
        self.limit.unwrap_or(50).min(MAX_POLL_LIMIT)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendMessageRequest {
    pub body: String,
    /// Client generated id; resending with the same value does not duplicate the message
    pub client_token: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReplyRequest {
    pub body: String,
}

// ---- customer ----

/// Polls the caller's thread and marks support replies as read
#[utoipa::path(
    get,
    path = "/api/v1/chat/messages",
    tag = "Chat",
    summary = "Poll the support thread",
    params(PollQuery),
    responses(
        (status = 200, description = "Messages in ascending order"),
        (status = 401, description = "Not signed in", body = crate::errors::ErrorResponse),
        (status = 403, description = "Wrong role", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn poll_messages(
    State(state): State<AppState>,
    user: AuthUser,
    QueryParams(query): QueryParams<PollQuery>,
) -> Result<Response, ApiError> {
    let messages = state
        .services
        .chat
        .poll(user.user_id, query.since, query.limit())
        .await?;
    // Replies past the limit stay unread until a later poll returns them
    if let Some(last) = messages.last() {
        state
            .services
            .chat
            .mark_read(user.user_id, SenderRole::Customer, Some(last.created_at))
            .await?;
    }
    Ok(success_response(messages))
}

/// 201 for a new message, 200 when the client token was already used
#[utoipa::path(
    post,
    path = "/api/v1/chat/messages",
    tag = "Chat",
    summary = "Message support",
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message stored"),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse),
        (status = 401, description = "Not signed in", body = crate::errors::ErrorResponse),
        (status = 403, description = "Wrong role", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn send_message(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(payload): JsonBody<SendMessageRequest>,
) -> Result<Response, ApiError> {
    let (message, created) = state
        .services
        .chat
        .send(user.user_id, &payload.body, payload.client_token)
        .await?;
    if created {
        Ok(created_response(message))
    } else {
        Ok(success_response(message))
    }
}

// ---- admin ----

pub async fn list_conversations(State(state): State<AppState>) -> Result<Response, ApiError> {
    Ok(success_response(state.services.chat.conversations().await?))
}

pub async fn admin_poll_thread(
    State(state): State<AppState>,
    PathParam(customer_id): PathParam<Uuid>,
    QueryParams(query): QueryParams<PollQuery>,
) -> Result<Response, ApiError> {
    let messages = state
        .services
        .chat
        .poll(customer_id, query.since, query.limit())
        .await?;
    Ok(success_response(messages))
}

pub async fn admin_reply(
    State(state): State<AppState>,
    admin: AuthUser,
    PathParam(customer_id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<ReplyRequest>,
) -> Result<Response, ApiError> {
    let message = state
        .services
        .chat
        .reply(admin.user_id, customer_id, &payload.body)
        .await?;
    Ok(created_response(message))
}

pub async fn admin_mark_read(
    State(state): State<AppState>,
    PathParam(customer_id): PathParam<Uuid>,
) -> Result<Response, ApiError> {
    let marked = state
        .services
        .chat
        .mark_read(customer_id, SenderRole::Admin, None)
        .await?;
    Ok(success_response(json!({ "marked_read": marked })))
}
