use axum::Json;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Meals API",
        version = "1.0.0",
        description = r#"
# Meals-on-Wheels API

Storefront and back office for a meal delivery service: menu, cart, checkout, orders,
blog, support chat, newsletters and an activity log.

## Authentication

Sign in with `POST /api/v1/auth/login` and send the returned token on every call:

```
Authorization: Bearer <token>
```

Guests can keep a cart by sending a stable `x-cart-session` header. The guest cart is
merged into the account on login.

## Errors

```json
{
  "success": false,
  "error": "Not Found",
  "message": "Order 4b1c... not found",
  "request_id": "2f0e...",
  "timestamp": "2024-01-01T00:00:00Z"
}
```

## Pagination

List endpoints take `page` (from 1) and `per_page` (capped at 100) and return a
`pagination` block with `total_items` and `total_pages`.
        "#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Auth", description = "Registration, sessions and password reset"),
        (name = "Menu", description = "Public menu"),
        (name = "Cart", description = "Guest and customer carts"),
        (name = "Orders", description = "Checkout and order history"),
        (name = "Blog", description = "Posts, likes and comments"),
        (name = "Chat", description = "Customer support messages"),
        (name = "Dashboards", description = "Per-role summaries"),
        (name = "Admin", description = "Back office endpoints")
    ),
    paths(
        crate::handlers::auth::register,
        crate::handlers::auth::login,
        crate::handlers::auth::logout,
        crate::handlers::auth::forgot_password,
        crate::handlers::auth::reset_password,
        crate::handlers::menu::list_menu,
        crate::handlers::menu::list_categories,
        crate::handlers::menu::get_menu_item,
        crate::handlers::cart::view_cart,
        crate::handlers::cart::cart_count,
        crate::handlers::cart::add_item,
        crate::handlers::orders::checkout,
        crate::handlers::orders::list_my_orders,
        crate::handlers::orders::get_my_order,
        crate::handlers::orders::cancel_my_order,
        crate::handlers::orders::admin_update_status,
        crate::handlers::blog::list_posts,
        crate::handlers::blog::like_post,
        crate::handlers::blog::toggle_like,
        crate::handlers::blog::add_comment,
        crate::handlers::chat::poll_messages,
        crate::handlers::chat::send_message,
        crate::handlers::dashboard::admin_dashboard,
        crate::handlers::dashboard::customer_dashboard,
        crate::handlers::dashboard::delivery_dashboard,
        crate::handlers::activity::recent_activity,
    ),
    components(
        schemas(
            crate::errors::ErrorResponse,
            crate::common::Pagination,
            crate::auth::AccessToken,
            crate::entities::UserRole,
            crate::entities::OrderStatus,
            crate::services::accounts::RegisterInput,
            crate::services::orders::CheckoutDetails,
            crate::services::cart::CartView,
            crate::services::cart::CartLine,
            crate::services::chat::ConversationSummary,
            crate::services::dashboard::DeliveryDashboard,
            crate::services::dashboard::ReferralStats,
            crate::handlers::auth::LoginRequest,
            crate::handlers::auth::ForgotPasswordRequest,
            crate::handlers::auth::ResetPasswordRequest,
            crate::handlers::cart::AddCartItemRequest,
            crate::handlers::orders::UpdateStatusRequest,
            crate::handlers::blog::CommentRequest,
            crate::handlers::chat::SendMessageRequest,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDocV1;

/// Registers the bearer scheme referenced by `security(("bearer_auth" = []))`
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// `GET /api-docs/openapi.json`
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDocV1::openapi())
}
