mod common;

use assert_matches::assert_matches;
use axum::http::{Method, StatusCode};
use chrono::Utc;
use common::{response_json, Caller, TestApp, TEST_PASSWORD};
use meals_api::{
    entities::{user, UserRole},
    errors::ServiceError,
};
use sea_orm::{ActiveModelTrait, Set};
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn register_then_login_returns_a_usable_token() {
    let app = TestApp::new().await;

    let response = app
        .post(
            "/api/v1/auth/register",
            json!({
                "name": "Carla Customer",
                "email": "Carla@Example.com",
                "password": "long-enough-passw0rd",
                "address": "12 Elm Street"
            }),
            Caller::anonymous(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["user"]["email"], "carla@example.com");
    assert_eq!(body["data"]["user"]["role"], "customer");
    assert!(body["data"]["user"].get("password_hash").is_none());

    let response = app
        .post(
            "/api/v1/auth/login",
            json!({ "email": "carla@example.com", "password": "long-enough-passw0rd" }),
            Caller::anonymous(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let token = body["data"]["access_token"].as_str().expect("token").to_string();
    assert_eq!(body["data"]["token_type"], "Bearer");

    let response = app.get("/api/v1/me", Caller::bearer(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["name"], "Carla Customer");
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let app = TestApp::new().await;
    let payload = json!({
        "name": "Dup",
        "email": "dup@example.com",
        "password": "long-enough-passw0rd"
    });

    let first = app
        .post("/api/v1/auth/register", payload.clone(), Caller::anonymous())
        .await;
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = app
        .post("/api/v1/auth/register", payload, Caller::anonymous())
        .await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let body = response_json(second).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Conflict");
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let app = TestApp::new().await;
    app.customer("wrongpw@example.com").await;

    let response = app
        .post(
            "/api/v1/auth/login",
            json!({ "email": "wrongpw@example.com", "password": "not-the-password" }),
            Caller::anonymous(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn protected_routes_require_a_token() {
    let app = TestApp::new().await;

    for uri in ["/api/v1/me", "/api/v1/orders", "/api/v1/admin/dashboard"] {
        let response = app.get(uri, Caller::anonymous()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", uri);
    }
}

#[tokio::test]
async fn role_groups_reject_other_roles() {
    let mut app = TestApp::new().await;
    let (_, customer) = app.customer("role-customer@example.com").await;
    let (_, driver) = app
        .user_with_role(UserRole::Delivery, "role-driver@example.com")
        .await;
    let (_, admin) = app.admin().await;

    let cases = [
        ("/api/v1/admin/dashboard", customer.as_str(), StatusCode::FORBIDDEN),
        ("/api/v1/delivery/orders", customer.as_str(), StatusCode::FORBIDDEN),
        ("/api/v1/dashboard/customer", driver.as_str(), StatusCode::FORBIDDEN),
        ("/api/v1/dashboard/ambassador", admin.as_str(), StatusCode::FORBIDDEN),
        ("/api/v1/dashboard/customer", customer.as_str(), StatusCode::OK),
        ("/api/v1/delivery/orders", driver.as_str(), StatusCode::OK),
        ("/api/v1/admin/dashboard", admin.as_str(), StatusCode::OK),
    ];
    for (uri, token, expected) in cases {
        let response = app.get(uri, Caller::bearer(token)).await;
        assert_eq!(response.status(), expected, "{}", uri);
    }
}

#[tokio::test]
async fn unknown_routes_are_not_found_even_when_anonymous() {
    let app = TestApp::new().await;
    let response = app.get("/api/v1/no-such-thing", Caller::anonymous()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn garbage_token_is_rejected() {
    let app = TestApp::new().await;
    let response = app.get("/api/v1/menu", Caller::bearer("not-a-jwt")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_revokes_the_token() {
    let app = TestApp::new().await;
    let (_, token) = app.customer("logout@example.com").await;

    let response = app
        .request(Method::POST, "/api/v1/auth/logout", None, Caller::bearer(&token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["message"], "Signed out");

    let response = app.get("/api/v1/me", Caller::bearer(&token)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn password_reset_round_trip_in_development() {
    let app = TestApp::new().await;
    app.customer("forgetful@example.com").await;

    let response = app
        .post(
            "/api/v1/auth/password/forgot",
            json!({ "email": "forgetful@example.com" }),
            Caller::anonymous(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let reset_token = body["data"]["token"].as_str().expect("reset token").to_string();

    let response = app
        .post(
            "/api/v1/auth/password/reset",
            json!({ "token": reset_token, "new_password": "a-brand-new-secret-7" }),
            Caller::anonymous(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Tokens are single use
    let response = app
        .post(
            "/api/v1/auth/password/reset",
            json!({ "token": reset_token, "new_password": "yet-another-secret-8" }),
            Caller::anonymous(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let old = app
        .post(
            "/api/v1/auth/login",
            json!({ "email": "forgetful@example.com", "password": TEST_PASSWORD }),
            Caller::anonymous(),
        )
        .await;
    assert_eq!(old.status(), StatusCode::UNAUTHORIZED);

    let new = app
        .post(
            "/api/v1/auth/login",
            json!({ "email": "forgetful@example.com", "password": "a-brand-new-secret-7" }),
            Caller::anonymous(),
        )
        .await;
    assert_eq!(new.status(), StatusCode::OK);
}

#[tokio::test]
async fn forgot_password_hides_the_token_outside_development() {
    let app = TestApp::with_environment("production").await;
    app.customer("prod-user@example.com").await;

    for email in ["prod-user@example.com", "nobody@example.com"] {
        let response = app
            .post(
                "/api/v1/auth/password/forgot",
                json!({ "email": email }),
                Caller::anonymous(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert!(body["data"].is_null());
        assert!(body["message"].as_str().unwrap_or_default().contains("reset link"));
    }
}

#[tokio::test]
async fn blank_names_are_rejected_at_registration() {
    let app = TestApp::new().await;
    let response = app
        .post(
            "/api/v1/auth/register",
            json!({ "name": "   ", "email": "blank@example.com", "password": "long-enough-passw0rd" }),
            Caller::anonymous(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response_json(response).await["success"], false);
}

#[tokio::test]
async fn duplicate_email_rows_surface_as_conflicts() {
    let app = TestApp::new().await;
    let (existing, _) = app.customer("race@example.com").await;

    // Same email inserted past the lookup, as a concurrent sign-up would
    let now = Utc::now();
    let err = user::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set("Racer".to_string()),
        email: Set(existing.email.clone()),
        password_hash: Set(existing.password_hash.clone()),
        role: Set(UserRole::Customer),
        phone: Set(None),
        address: Set(None),
        is_active: Set(true),
        newsletter_opt_in: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&*app.state.db)
    .await
    .expect_err("email is unique");

    let err = ServiceError::from(err);
    assert!(err.is_unique_violation());
    let err = err.conflict_on_duplicate(|| "taken".to_string());
    assert_matches!(err, ServiceError::Conflict(msg) if msg == "taken");
}

#[tokio::test]
async fn malformed_path_and_query_values_use_the_error_envelope() {
    let app = TestApp::new().await;
    let (_, token) = app.customer("typo@example.com").await;

    for uri in [
        "/api/v1/orders/not-a-uuid",
        "/api/v1/chat/messages?since=yesterday",
        "/api/v1/menu?page=first",
    ] {
        let response = app.get(uri, Caller::bearer(&token)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        let body = response_json(response).await;
        assert_eq!(body["success"], false, "{}", uri);
        assert_eq!(body["error"], "Bad Request", "{}", uri);
        assert!(body["message"].is_string(), "{}", uri);
        assert!(body["timestamp"].is_string(), "{}", uri);
    }
}
