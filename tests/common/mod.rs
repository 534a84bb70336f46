#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use meals_api::{
    build_router,
    config::AppConfig,
    db::{self, DbConfig},
    entities::{menu_item, user, UserRole},
    services::{
        menu::MenuItemInput,
        users::NewUser,
    },
    AppState,
};
use rust_decimal::Decimal;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_PASSWORD: &str = "correct-horse-battery-42";

/// Application wired against a fresh in-memory SQLite database
pub struct TestApp {
    router: Router,
    pub state: AppState,
    admin: Option<(user::Model, String)>,
}

/// A caller's headers, built up per request
#[derive(Default, Clone)]
pub struct Caller<'a> {
    pub token: Option<&'a str>,
    pub cart_session: Option<&'a str>,
}

impl<'a> Caller<'a> {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn bearer(token: &'a str) -> Self {
        Self {
            token: Some(token),
            cart_session: None,
        }
    }

    pub fn guest(session: &'a str) -> Self {
        Self {
            token: None,
            cart_session: Some(session),
        }
    }
}

impl TestApp {
    /// Fresh application in the development environment
    pub async fn new() -> Self {
        Self::with_environment("development").await
    }

    pub async fn with_environment(environment: &str) -> Self {
        let pool = db::establish_connection_with_config(&DbConfig::in_memory_sqlite())
            .await
            .expect("failed to open in-memory database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "integration_test_secret_that_is_long_enough".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            environment.to_string(),
        );

        let state = AppState::new(Arc::new(pool), cfg);
        let router = build_router(state.clone());

        Self {
            router,
            state,
            admin: None,
        }
    }

    /// Creates an account with the given role and signs it in
    pub async fn user_with_role(&self, role: UserRole, email: &str) -> (user::Model, String) {
        let account = self
            .state
            .services
            .users
            .create(NewUser {
                name: format!("Test {}", role),
                email: email.to_string(),
                password: TEST_PASSWORD.to_string(),
                role,
            })
            .await
            .expect("create test user");
        let token = self.token_for(&account);
        (account, token)
    }

    pub fn token_for(&self, account: &user::Model) -> String {
        self.state
            .auth
            .generate_token(account)
            .expect("issue token")
            .access_token
    }

    pub async fn customer(&self, email: &str) -> (user::Model, String) {
        self.user_with_role(UserRole::Customer, email).await
    }

    /// One admin per app, created on first use
    pub async fn admin(&mut self) -> (user::Model, String) {
        if self.admin.is_none() {
            let admin = self.user_with_role(UserRole::Admin, "admin@example.com").await;
            self.admin = Some(admin);
        }
        self.admin.clone().expect("admin created above")
    }

    pub async fn seed_menu_item(&self, name: &str, price: Decimal) -> menu_item::Model {
        self.state
            .services
            .menu
            .create(
                MenuItemInput {
                    name: name.to_string(),
                    description: format!("{} for testing", name),
                    category: "Mains".to_string(),
                    price,
                    image_url: None,
                    is_available: true,
                },
                Uuid::new_v4(),
            )
            .await
            .expect("seed menu item")
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        caller: Caller<'_>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = caller.token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        if let Some(session) = caller.cart_session {
            builder = builder.header("x-cart-session", session);
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn get(&self, uri: &str, caller: Caller<'_>) -> Response {
        self.request(Method::GET, uri, None, caller).await
    }

    pub async fn post(&self, uri: &str, body: Value, caller: Caller<'_>) -> Response {
        self.request(Method::POST, uri, Some(body), caller).await
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
