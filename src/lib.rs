//! Meals API library
//!
//! Storefront and back office for a meals-on-wheels delivery service
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod common;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{
    extract::State,
    http::HeaderValue,
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
};
use utoipa::ToSchema;

use crate::auth::{AuthConfig, AuthRouterExt, AuthService};
use crate::config::AppConfig;
use crate::entities::UserRole;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub services: handlers::AppServices,
    pub auth: Arc<AuthService>,
}

impl AppState {
    /// Wires every service against one connection pool
    pub fn new(db: Arc<DatabaseConnection>, config: AppConfig) -> Self {
        let services = handlers::AppServices::new(db.clone(), &config);
        let auth = Arc::new(AuthService::new(AuthConfig::from(&config)));
        Self {
            db,
            config: Arc::new(config),
            services,
            auth,
        }
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    /// Successful call with nothing to return but a note
    pub fn message(message: String) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn validation_errors(errors: Vec<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some("Validation failed".to_string()),
            errors: Some(errors),
            meta: Some(ResponseMeta::capture()),
        }
    }
}


/// Every `/api/v1` route, grouped by who may call it
pub fn api_v1_routes() -> Router<AppState> {
    use handlers::{
        account, activity, auth as auth_handlers, blog, cart, chat, dashboard, menu, newsletters,
        orders, users,
    };

    // Anyone, signed in or not
    let public = Router::new()
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        .route("/auth/register", post(auth_handlers::register))
        .route("/auth/login", post(auth_handlers::login))
        .route("/auth/password/forgot", post(auth_handlers::forgot_password))
        .route("/auth/password/reset", post(auth_handlers::reset_password))
        .route("/menu", get(menu::list_menu))
        .route("/menu/categories", get(menu::list_categories))
        .route("/menu/:id", get(menu::get_menu_item))
        .route("/blog/posts", get(blog::list_posts))
        .route("/blog/posts/:id", get(blog::get_post))
        .route("/blog/posts/:id/comments", get(blog::list_comments))
        // Guests identify their cart with the session header
        .route("/cart", get(cart::view_cart).delete(cart::clear_cart))
        .route("/cart/count", get(cart::cart_count))
        .route("/cart/items", post(cart::add_item))
        .route(
            "/cart/items/:id",
            put(cart::update_item).delete(cart::remove_item),
        );

    // Any signed-in role
    let signed_in = Router::new()
        .route("/auth/logout", post(auth_handlers::logout))
        .route("/me", get(account::get_me).put(account::update_me))
        .route("/me/password", put(account::change_password))
        .route("/me/newsletter", put(account::set_newsletter))
        .route(
            "/blog/posts/:id/like",
            post(blog::like_post).delete(blog::unlike_post),
        )
        .route("/blog/posts/:id/like/toggle", post(blog::toggle_like))
        .route("/blog/posts/:id/comments", post(blog::add_comment))
        .with_auth();

    let customer = Router::new()
        .route("/checkout", post(orders::checkout))
        .route("/orders", get(orders::list_my_orders))
        .route("/orders/:id", get(orders::get_my_order))
        .route("/orders/:id/cancel", post(orders::cancel_my_order))
        .route(
            "/chat/messages",
            get(chat::poll_messages).post(chat::send_message),
        )
        .route("/dashboard/customer", get(dashboard::customer_dashboard))
        .with_roles(&[UserRole::Customer]);

    let delivery = Router::new()
        .route("/delivery/orders", get(orders::list_assigned))
        .route("/delivery/orders/:id/start", post(orders::start_delivery))
        .route(
            "/delivery/orders/:id/complete",
            post(orders::complete_delivery),
        )
        .route("/dashboard/delivery", get(dashboard::delivery_dashboard))
        .with_roles(&[UserRole::Delivery]);

    let ambassador = Router::new()
        .route("/dashboard/ambassador", get(dashboard::ambassador_dashboard))
        .with_roles(&[UserRole::Ambassador]);

    let admin = Router::new()
        .route("/dashboard", get(dashboard::admin_dashboard))
        .route("/activity", get(activity::list_activity))
        .route("/activity/recent", get(activity::recent_activity))
        .route("/orders", get(orders::admin_list_orders))
        .route("/orders/:id", get(orders::admin_get_order))
        .route("/orders/:id/status", put(orders::admin_update_status))
        .route("/orders/:id/assign", put(orders::admin_assign_delivery))
        .route(
            "/menu",
            get(menu::admin_list_menu).post(menu::create_menu_item),
        )
        .route(
            "/menu/:id",
            get(menu::admin_get_menu_item)
                .put(menu::update_menu_item)
                .delete(menu::delete_menu_item),
        )
        .route("/menu/:id/availability", put(menu::set_availability))
        .route("/users", get(users::list_users).post(users::create_user))
        .route(
            "/users/:id",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route(
            "/blog/posts",
            get(blog::admin_list_posts).post(blog::create_post),
        )
        .route(
            "/blog/posts/:id",
            get(blog::admin_get_post)
                .put(blog::update_post)
                .delete(blog::delete_post),
        )
        .route("/blog/posts/:id/publish", post(blog::publish_post))
        .route("/blog/posts/:id/unpublish", post(blog::unpublish_post))
        .route("/blog/comments/:id", delete(blog::delete_comment))
        .route("/chat/conversations", get(chat::list_conversations))
        .route(
            "/chat/:customer_id/messages",
            get(chat::admin_poll_thread).post(chat::admin_reply),
        )
        .route("/chat/:customer_id/read", post(chat::admin_mark_read))
        .route(
            "/newsletters/templates",
            get(newsletters::list_templates).post(newsletters::create_template),
        )
        .route(
            "/newsletters/templates/:id",
            get(newsletters::get_template)
                .put(newsletters::update_template)
                .delete(newsletters::delete_template),
        )
        .route(
            "/newsletters/campaigns",
            get(newsletters::list_campaigns).post(newsletters::create_campaign),
        )
        .route(
            "/newsletters/campaigns/:id",
            get(newsletters::get_campaign)
                .put(newsletters::update_campaign)
                .delete(newsletters::delete_campaign),
        )
        .route(
            "/newsletters/campaigns/:id/schedule",
            post(newsletters::schedule_campaign),
        )
        .route(
            "/newsletters/campaigns/:id/send",
            post(newsletters::send_campaign),
        )
        .with_roles(&[UserRole::Admin]);

    Router::new()
        .merge(public)
        .merge(signed_in)
        .merge(customer)
        .merge(delivery)
        .merge(ambassador)
        .nest("/admin", admin)
}

/// Full application router with the middleware stack applied
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    let timeout = Duration::from_secs(state.config.request_timeout_secs);

    Router::new()
        .nest("/api/v1", api_v1_routes())
        .route("/api-docs/openapi.json", get(openapi::openapi_json))
        .layer(axum::middleware::from_fn_with_state(
            state.auth.clone(),
            auth::auth_context_middleware,
        ))
        .layer(crate::tracing::configure_http_tracing())
        .layer(axum::middleware::from_fn(
            crate::tracing::request_logging_middleware,
        ))
        .layer(TimeoutLayer::new(timeout))
        .layer(CompressionLayer::new())
        .layer(cors)
        // Outermost so every log line and error body carries the id
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if !origins.is_empty() {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else if config.should_allow_permissive_cors() {
        CorsLayer::permissive()
    } else {
        // Configuration validation rejects this combination; deny cross-origin calls if reached
        CorsLayer::new()
    }
}

async fn api_status(State(state): State<AppState>) -> Json<ApiResponse<Value>> {
    Json(ApiResponse::success(json!({
        "status": "ok",
        "service": "meals-api",
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.environment,
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<Value>> {
    let database = match db::check_connection(&state.db).await {
        Ok(()) => "healthy",
        Err(_) => "unhealthy",
    };

    Json(ApiResponse::success(json!({
        "status": database,
        "checks": { "database": database },
        "timestamp": Utc::now().to_rfc3339(),
    })))
}
