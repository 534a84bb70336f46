mod common;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use common::{response_json, Caller, TestApp, TEST_PASSWORD};
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn newsletter_campaign_sends_once() {
    let mut app = TestApp::new().await;
    let (_, admin) = app.admin().await;

    let response = app
        .post(
            "/api/v1/admin/newsletters/templates",
            json!({ "name": "Monthly", "subject": "This month's menu", "body": "<p>Hello</p>" }),
            Caller::bearer(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let template_id = response_json(response).await["data"]["id"].clone();

    let response = app
        .post(
            "/api/v1/admin/newsletters/campaigns",
            json!({ "template_id": template_id }),
            Caller::bearer(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let campaign = response_json(response).await["data"].clone();
    assert_eq!(campaign["subject"], "This month's menu");
    assert_eq!(campaign["status"], "draft");
    let campaign_id = campaign["id"].as_str().expect("campaign id").to_string();

    let send_uri = format!("/api/v1/admin/newsletters/campaigns/{}/send", campaign_id);
    let response = app
        .request(Method::POST, &send_uri, None, Caller::bearer(&admin))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "sent");
    assert!(!body["data"]["sent_at"].is_null());

    let response = app
        .request(Method::POST, &send_uri, None, Caller::bearer(&admin))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Sent campaigns are frozen
    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/admin/newsletters/campaigns/{}", campaign_id),
            Some(json!({ "subject": "Too late" })),
            Caller::bearer(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn campaigns_need_content_and_a_future_schedule() {
    let mut app = TestApp::new().await;
    let (_, admin) = app.admin().await;

    let response = app
        .post(
            "/api/v1/admin/newsletters/campaigns",
            json!({ "subject": "Subject only" }),
            Caller::bearer(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post(
            "/api/v1/admin/newsletters/campaigns",
            json!({ "subject": "Spring", "body": "New salads" }),
            Caller::bearer(&admin),
        )
        .await;
    let campaign_id = response_json(response).await["data"]["id"]
        .as_str()
        .expect("campaign id")
        .to_string();
    let schedule_uri = format!("/api/v1/admin/newsletters/campaigns/{}/schedule", campaign_id);

    let past = (Utc::now() - Duration::hours(1)).to_rfc3339();
    let response = app
        .post(&schedule_uri, json!({ "scheduled_at": past }), Caller::bearer(&admin))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let future = (Utc::now() + Duration::days(2)).to_rfc3339();
    let response = app
        .post(&schedule_uri, json!({ "scheduled_at": future }), Caller::bearer(&admin))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["data"]["status"], "scheduled");
}

#[tokio::test]
async fn admins_cannot_remove_themselves_or_users_with_history() {
    let mut app = TestApp::new().await;
    let (admin_user, admin) = app.admin().await;
    let (customer, customer_token) = app.customer("history@example.com").await;
    let (bystander, _) = app.customer("bystander@example.com").await;

    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/admin/users/{}", admin_user.id),
            None,
            Caller::bearer(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/admin/users/{}", admin_user.id),
            Some(json!({ "role": "customer" })),
            Caller::bearer(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let meal = app.seed_menu_item("Fish Pie", dec!(10.00)).await;
    app.post(
        "/api/v1/cart/items",
        json!({ "menu_item_id": meal.id }),
        Caller::bearer(&customer_token),
    )
    .await;
    let response = app
        .post(
            "/api/v1/checkout",
            json!({ "delivery_address": "3 Quay Street" }),
            Caller::bearer(&customer_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/admin/users/{}", customer.id),
            None,
            Caller::bearer(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/admin/users/{}", bystander.id),
            None,
            Caller::bearer(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .get(&format!("/api/v1/admin/users/{}", bystander.id), Caller::bearer(&admin))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deactivated_accounts_cannot_sign_in() {
    let mut app = TestApp::new().await;
    let (_, admin) = app.admin().await;
    let (customer, _) = app.customer("paused@example.com").await;

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/admin/users/{}", customer.id),
            Some(json!({ "is_active": false })),
            Caller::bearer(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .post(
            "/api/v1/auth/login",
            json!({ "email": "paused@example.com", "password": TEST_PASSWORD }),
            Caller::anonymous(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn recent_activity_is_newest_first() {
    let mut app = TestApp::new().await;
    let (_, admin) = app.admin().await;

    for subject in ["First", "Second"] {
        app.post(
            "/api/v1/admin/newsletters/campaigns",
            json!({ "subject": subject, "body": "Body" }),
            Caller::bearer(&admin),
        )
        .await;
    }

    let response = app
        .get("/api/v1/admin/activity/recent?limit=2", Caller::bearer(&admin))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let entries = body["data"].as_array().expect("entries");
    assert_eq!(entries.len(), 2);
    assert!(entries[0]["description"]
        .as_str()
        .unwrap_or_default()
        .contains("Second"));
    assert!(entries[1]["description"]
        .as_str()
        .unwrap_or_default()
        .contains("First"));

    let response = app.get("/api/v1/admin/dashboard", Caller::bearer(&admin)).await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["total_orders"], 0);
    assert!(!body["data"]["recent_activity"].as_array().expect("feed").is_empty());
}

#[tokio::test]
async fn deleting_a_menu_item_clears_it_from_carts() {
    let mut app = TestApp::new().await;
    let (_, admin) = app.admin().await;
    let (_, token) = app.customer("hungry@example.com").await;
    let stew = app.seed_menu_item("Beef Stew", dec!(9.50)).await;
    let bread = app.seed_menu_item("Soda Bread", dec!(2.00)).await;

    for (caller, item, quantity) in [
        (Caller::bearer(&token), stew.id, 2),
        (Caller::bearer(&token), bread.id, 1),
        (Caller::guest("guest-cart-menu-delete"), stew.id, 1),
    ] {
        let response = app
            .post(
                "/api/v1/cart/items",
                json!({ "menu_item_id": item, "quantity": quantity }),
                caller,
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let stew_uri = format!("/api/v1/admin/menu/{}", stew.id);
    let response = app
        .request(Method::DELETE, &stew_uri, None, Caller::bearer(&admin))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.get("/api/v1/cart/count", Caller::bearer(&token)).await;
    assert_eq!(response_json(response).await["data"]["count"], 1);
    let response = app
        .get("/api/v1/cart/count", Caller::guest("guest-cart-menu-delete"))
        .await;
    assert_eq!(response_json(response).await["data"]["count"], 0);

    let response = app
        .get(&format!("/api/v1/menu/{}", stew.id), Caller::anonymous())
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let response = app
        .request(Method::DELETE, &stew_uri, None, Caller::bearer(&admin))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn activity_log_filters_by_type_and_pages() {
    let mut app = TestApp::new().await;
    let (_, admin) = app.admin().await;

    for subject in ["Autumn", "Winter", "Spring"] {
        let response = app
            .post(
                "/api/v1/admin/newsletters/campaigns",
                json!({ "subject": subject, "body": "Body" }),
                Caller::bearer(&admin),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = app
        .get(
            "/api/v1/admin/activity?activity_type=newsletter&per_page=2",
            Caller::bearer(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let pagination = &body["data"]["pagination"];
    assert_eq!(pagination["total_items"], 3);
    assert_eq!(pagination["total_pages"], 2);
    assert_eq!(pagination["has_next"], true);
    let items = body["data"]["items"].as_array().expect("items");
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|e| e["activity_type"] == "newsletter"));
    assert!(items[0]["description"].as_str().unwrap_or_default().contains("Spring"));

    let response = app
        .get(
            "/api/v1/admin/activity?activity_type=newsletter&per_page=2&page=2",
            Caller::bearer(&admin),
        )
        .await;
    let body = response_json(response).await;
    let items = body["data"]["items"].as_array().expect("items");
    assert_eq!(items.len(), 1);
    assert!(items[0]["description"].as_str().unwrap_or_default().contains("Autumn"));

    // The admin account itself was logged under another type
    let response = app
        .get("/api/v1/admin/activity?activity_type=user", Caller::bearer(&admin))
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["pagination"]["total_items"], 1);
}

#[tokio::test]
async fn support_inbox_tracks_unread_threads_for_admins_only() {
    let mut app = TestApp::new().await;
    let (_, admin) = app.admin().await;
    let (first, first_token) = app.customer("first-thread@example.com").await;
    let (_, second_token) = app.customer("second-thread@example.com").await;

    for body in ["Is the soup vegan?", "And gluten free?"] {
        app.post("/api/v1/chat/messages", json!({ "body": body }), Caller::bearer(&first_token))
            .await;
    }
    app.post(
        "/api/v1/chat/messages",
        json!({ "body": "Can I change my order?" }),
        Caller::bearer(&second_token),
    )
    .await;

    let response = app
        .get("/api/v1/admin/chat/conversations", Caller::bearer(&second_token))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .get("/api/v1/admin/chat/conversations", Caller::bearer(&admin))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let threads = body["data"].as_array().expect("threads");
    assert_eq!(threads.len(), 2);
    let first_thread = threads
        .iter()
        .find(|t| t["customer_id"] == first.id.to_string())
        .expect("first thread");
    assert_eq!(first_thread["unread_count"], 2);
    assert_eq!(first_thread["last_message_preview"], "And gluten free?");

    let response = app.get("/api/v1/admin/dashboard", Caller::bearer(&admin)).await;
    assert_eq!(response_json(response).await["data"]["unread_messages"], 3);

    app.request(
        Method::POST,
        &format!("/api/v1/admin/chat/{}/read", first.id),
        None,
        Caller::bearer(&admin),
    )
    .await;
    let response = app.get("/api/v1/admin/dashboard", Caller::bearer(&admin)).await;
    assert_eq!(response_json(response).await["data"]["unread_messages"], 1);
}
