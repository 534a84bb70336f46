use super::common::{
    created_response, no_content_response, page_window, success_response, JsonBody, PathParam,
    QueryParams,
};
use crate::{
    auth::AuthUser,
    common::PageParams,
    errors::ApiError,
    handlers::AppState,
    services::blog::{PostFilter, PostInput, PostUpdate},
};
use axum::{extract::State, response::Response};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub search: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CommentRequest {
    pub body: String,
}

// ---- public ----

#[utoipa::path(
    get,
    path = "/api/v1/blog/posts",
    tag = "Blog",
    summary = "List published posts",
    params(PageParams),
    responses(
        (status = 200, description = "Page of posts"),
    )
)]
pub async fn list_posts(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<PageParams>,
    QueryParams(query): QueryParams<SearchQuery>,
) -> Result<Response, ApiError> {
    let (page, per_page) = page_window(&state, &params);
    let posts = state
        .services
        .blog
        .list_published(query.search, page, per_page)
        .await?;
    Ok(success_response(posts))
}

pub async fn get_post(
    State(state): State<AppState>,
    PathParam(slug): PathParam<String>,
) -> Result<Response, ApiError> {
    let post = state.services.blog.get_published_by_slug(&slug).await?;
    Ok(success_response(post))
}

pub async fn list_comments(
    State(state): State<AppState>,
    PathParam(post_id): PathParam<Uuid>,
    QueryParams(params): QueryParams<PageParams>,
) -> Result<Response, ApiError> {
    let (page, per_page) = page_window(&state, &params);
    let comments = state
        .services
        .blog
        .list_comments(post_id, page, per_page)
        .await?;
    Ok(success_response(comments))
}

// ---- signed in ----

#[utoipa::path(
    post,
    path = "/api/v1/blog/posts/{id}/like",
    tag = "Blog",
    summary = "Like a post",
    params(("id" = Uuid, Path, description = "Post id")),
    responses(
        (status = 200, description = "Like state"),
        (status = 401, description = "Not signed in", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn like_post(
    State(state): State<AppState>,
    user: AuthUser,
    PathParam(post_id): PathParam<Uuid>,
) -> Result<Response, ApiError> {
    Ok(success_response(
        state.services.blog.like(post_id, user.user_id).await?,
    ))
}

pub async fn unlike_post(
    State(state): State<AppState>,
    user: AuthUser,
    PathParam(post_id): PathParam<Uuid>,
) -> Result<Response, ApiError> {
    Ok(success_response(
        state.services.blog.unlike(post_id, user.user_id).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/blog/posts/{id}/like/toggle",
    tag = "Blog",
    summary = "Toggle a like",
    params(("id" = Uuid, Path, description = "Post id")),
    responses(
        (status = 200, description = "Like state"),
        (status = 401, description = "Not signed in", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn toggle_like(
    State(state): State<AppState>,
    user: AuthUser,
    PathParam(post_id): PathParam<Uuid>,
) -> Result<Response, ApiError> {
    Ok(success_response(
        state.services.blog.toggle(post_id, user.user_id).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/blog/posts/{id}/comments",
    tag = "Blog",
    summary = "Comment on a post",
    params(("id" = Uuid, Path, description = "Post id")),
    request_body = CommentRequest,
    responses(
        (status = 201, description = "Comment created"),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse),
        (status = 401, description = "Not signed in", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn add_comment(
    State(state): State<AppState>,
    user: AuthUser,
    PathParam(post_id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<CommentRequest>,
) -> Result<Response, ApiError> {
    let comment = state
        .services
        .blog
        .add_comment(post_id, user.user_id, &payload.body)
        .await?;
    Ok(created_response(comment))
}

// ---- admin ----

pub async fn admin_list_posts(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<PageParams>,
    QueryParams(filter): QueryParams<PostFilter>,
) -> Result<Response, ApiError> {
    let (page, per_page) = page_window(&state, &params);
    let posts = state.services.blog.list(filter, page, per_page).await?;
    Ok(success_response(posts))
}

pub async fn admin_get_post(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<Response, ApiError> {
    Ok(success_response(state.services.blog.get(id).await?))
}

pub async fn create_post(
    State(state): State<AppState>,
    admin: AuthUser,
    JsonBody(payload): JsonBody<PostInput>,
) -> Result<Response, ApiError> {
    let post = state
        .services
        .blog
        .create_post(admin.user_id, payload)
        .await?;
    Ok(created_response(post))
}

pub async fn update_post(
    State(state): State<AppState>,
    admin: AuthUser,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<PostUpdate>,
) -> Result<Response, ApiError> {
    let post = state
        .services
        .blog
        .update_post(id, payload, admin.user_id)
        .await?;
    Ok(success_response(post))
}

pub async fn publish_post(
    State(state): State<AppState>,
    admin: AuthUser,
    PathParam(id): PathParam<Uuid>,
) -> Result<Response, ApiError> {
    Ok(success_response(
        state.services.blog.publish(id, admin.user_id).await?,
    ))
}

pub async fn unpublish_post(
    State(state): State<AppState>,
    admin: AuthUser,
    PathParam(id): PathParam<Uuid>,
) -> Result<Response, ApiError> {
    Ok(success_response(
        state.services.blog.unpublish(id, admin.user_id).await?,
    ))
}

pub async fn delete_post(
    State(state): State<AppState>,
    admin: AuthUser,
    PathParam(id): PathParam<Uuid>,
) -> Result<Response, ApiError> {
    state.services.blog.delete_post(id, admin.user_id).await?;
    Ok(no_content_response())
}

pub async fn delete_comment(
    State(state): State<AppState>,
    admin: AuthUser,
    PathParam(id): PathParam<Uuid>,
) -> Result<Response, ApiError> {
    state.services.blog.delete_comment(id, admin.user_id).await?;
    Ok(no_content_response())
}
