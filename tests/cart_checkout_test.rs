mod common;

use axum::http::{Method, StatusCode};
use common::{response_json, Caller, TestApp, TEST_PASSWORD};
use meals_api::entities::UserRole;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::str::FromStr;

const GUEST: &str = "guest-session-0001";

fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).expect("decimal string"),
        Value::Number(n) => Decimal::from_str(&n.to_string()).expect("decimal number"),
        other => panic!("not a decimal: {}", other),
    }
}

async fn cart_count(app: &TestApp, caller: Caller<'_>) -> i64 {
    let response = app.get("/api/v1/cart/count", caller).await;
    assert_eq!(response.status(), StatusCode::OK);
    response_json(response).await["data"]["count"]
        .as_i64()
        .expect("count")
}

#[tokio::test]
async fn anonymous_cart_needs_a_session_header() {
    let app = TestApp::new().await;
    let response = app.get("/api/v1/cart", Caller::anonymous()).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn guest_cart_counts_quantities_and_merges_on_login() {
    let app = TestApp::new().await;
    let soup = app.seed_menu_item("Lentil Soup", dec!(6.50)).await;
    let pie = app.seed_menu_item("Shepherd's Pie", dec!(11.00)).await;

    assert_eq!(cart_count(&app, Caller::guest(GUEST)).await, 0);

    let response = app
        .post(
            "/api/v1/cart/items",
            json!({ "menu_item_id": soup.id, "quantity": 2 }),
            Caller::guest(GUEST),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    // Adding the same item again bumps the existing line
    app.post(
        "/api/v1/cart/items",
        json!({ "menu_item_id": soup.id }),
        Caller::guest(GUEST),
    )
    .await;
    app.post(
        "/api/v1/cart/items",
        json!({ "menu_item_id": pie.id, "quantity": 1 }),
        Caller::guest(GUEST),
    )
    .await;
    assert_eq!(cart_count(&app, Caller::guest(GUEST)).await, 4);

    let (customer, _) = app.customer("merger@example.com").await;
    let response = app
        .post(
            "/api/v1/auth/login",
            json!({ "email": customer.email, "password": TEST_PASSWORD }),
            Caller::guest(GUEST),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["merged_cart_lines"], 2);
    let token = body["data"]["access_token"].as_str().expect("token").to_string();

    assert_eq!(cart_count(&app, Caller::bearer(&token)).await, 4);
    assert_eq!(cart_count(&app, Caller::guest(GUEST)).await, 0);

    let response = app.get("/api/v1/cart", Caller::bearer(&token)).await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["lines"].as_array().map(Vec::len), Some(2));
    assert_eq!(decimal(&body["data"]["subtotal"]), dec!(30.50));
}

#[tokio::test]
async fn zero_quantity_update_removes_the_line() {
    let app = TestApp::new().await;
    let (_, token) = app.customer("zero@example.com").await;
    let stew = app.seed_menu_item("Beef Stew", dec!(9.25)).await;

    let response = app
        .post(
            "/api/v1/cart/items",
            json!({ "menu_item_id": stew.id, "quantity": 3 }),
            Caller::bearer(&token),
        )
        .await;
    let line_id = response_json(response).await["data"]["id"]
        .as_str()
        .expect("line id")
        .to_string();

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/cart/items/{}", line_id),
            Some(json!({ "quantity": 0 })),
            Caller::bearer(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["removed"], true);
    assert_eq!(cart_count(&app, Caller::bearer(&token)).await, 0);
}

#[tokio::test]
async fn unavailable_items_cannot_be_added() {
    let mut app = TestApp::new().await;
    let (_, admin) = app.admin().await;
    let item = app.seed_menu_item("Seasonal Salad", dec!(7.00)).await;

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/admin/menu/{}/availability", item.id),
            Some(json!({ "is_available": false })),
            Caller::bearer(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .post(
            "/api/v1/cart/items",
            json!({ "menu_item_id": item.id }),
            Caller::guest(GUEST),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Hidden from the public menu as well
    let response = app
        .get(&format!("/api/v1/menu/{}", item.id), Caller::anonymous())
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn checkout_with_empty_cart_is_rejected() {
    let app = TestApp::new().await;
    let (_, token) = app.customer("empty@example.com").await;

    let response = app
        .post(
            "/api/v1/checkout",
            json!({ "delivery_address": "1 Main Road" }),
            Caller::bearer(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["message"], "Invalid operation: Cart is empty");
}

#[tokio::test]
async fn checkout_charges_delivery_below_threshold_and_empties_cart() {
    let app = TestApp::new().await;
    let (_, token) = app.customer("small-order@example.com").await;
    let soup = app.seed_menu_item("Tomato Soup", dec!(4.50)).await;

    app.post(
        "/api/v1/cart/items",
        json!({ "menu_item_id": soup.id, "quantity": 2 }),
        Caller::bearer(&token),
    )
    .await;

    let response = app
        .post(
            "/api/v1/checkout",
            json!({ "delivery_address": "1 Main Road", "delivery_notes": "Ring twice" }),
            Caller::bearer(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    let order = &body["data"];
    assert_eq!(order["status"], "pending");
    assert_eq!(decimal(&order["subtotal"]), dec!(9.00));
    assert_eq!(decimal(&order["delivery_fee"]), dec!(5.00));
    assert_eq!(decimal(&order["total"]), dec!(14.00));
    assert!(order["order_number"].as_str().unwrap_or_default().starts_with("MOW-"));
    assert_eq!(order["items"].as_array().map(Vec::len), Some(1));
    assert_eq!(order["items"][0]["name"], "Tomato Soup");

    assert_eq!(cart_count(&app, Caller::bearer(&token)).await, 0);
}

#[tokio::test]
async fn checkout_waives_fee_at_threshold() {
    let app = TestApp::new().await;
    let (_, token) = app.customer("big-order@example.com").await;
    let platter = app.seed_menu_item("Family Platter", dec!(25.00)).await;

    app.post(
        "/api/v1/cart/items",
        json!({ "menu_item_id": platter.id, "quantity": 2 }),
        Caller::bearer(&token),
    )
    .await;
    let response = app
        .post(
            "/api/v1/checkout",
            json!({ "delivery_address": "9 Hill Lane" }),
            Caller::bearer(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert_eq!(decimal(&body["data"]["delivery_fee"]), Decimal::ZERO);
    assert_eq!(decimal(&body["data"]["total"]), dec!(50.00));
}

async fn place_order(app: &TestApp, token: &str) -> String {
    let meal = app.seed_menu_item("Roast Chicken", dec!(12.00)).await;
    app.post(
        "/api/v1/cart/items",
        json!({ "menu_item_id": meal.id }),
        Caller::bearer(token),
    )
    .await;
    let response = app
        .post(
            "/api/v1/checkout",
            json!({ "delivery_address": "4 River Walk" }),
            Caller::bearer(token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    response_json(response).await["data"]["id"]
        .as_str()
        .expect("order id")
        .to_string()
}

#[tokio::test]
async fn customers_only_see_their_own_orders() {
    let app = TestApp::new().await;
    let (_, alice) = app.customer("alice@example.com").await;
    let (_, bob) = app.customer("bob@example.com").await;
    let order_id = place_order(&app, &alice).await;

    let response = app
        .get(&format!("/api/v1/orders/{}", order_id), Caller::bearer(&alice))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .get(&format!("/api/v1/orders/{}", order_id), Caller::bearer(&bob))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.get("/api/v1/orders", Caller::bearer(&bob)).await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["pagination"]["total_items"], 0);
}

#[tokio::test]
async fn only_pending_orders_can_be_cancelled() {
    let mut app = TestApp::new().await;
    let (_, admin) = app.admin().await;
    let (_, token) = app.customer("canceller@example.com").await;

    let first = place_order(&app, &token).await;
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{}/cancel", first),
            None,
            Caller::bearer(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["data"]["status"], "cancelled");

    let second = place_order(&app, &token).await;
    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/admin/orders/{}/status", second),
            Some(json!({ "status": "confirmed" })),
            Caller::bearer(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{}/cancel", second),
            None,
            Caller::bearer(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Cancelled orders count toward neither revenue nor spend
    let response = app.get("/api/v1/admin/dashboard", Caller::bearer(&admin)).await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["total_orders"], 2);
    assert_eq!(decimal(&body["data"]["revenue"]), dec!(17.00));

    let response = app.get("/api/v1/dashboard/customer", Caller::bearer(&token)).await;
    let body = response_json(response).await;
    assert_eq!(decimal(&body["data"]["total_spent"]), dec!(17.00));
}

#[tokio::test]
async fn blank_delivery_address_falls_back_to_profile() {
    let app = TestApp::new().await;
    let (_, token) = app.customer("homebody@example.com").await;
    let response = app
        .request(
            Method::PUT,
            "/api/v1/me",
            Some(json!({ "address": "1 Main St" })),
            Caller::bearer(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let meal = app.seed_menu_item("Shepherd's Pie", dec!(11.00)).await;
    app.post(
        "/api/v1/cart/items",
        json!({ "menu_item_id": meal.id }),
        Caller::bearer(&token),
    )
    .await;

    let response = app
        .post(
            "/api/v1/checkout",
            json!({ "delivery_address": "   " }),
            Caller::bearer(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response_json(response).await["data"]["delivery_address"], "1 Main St");
}

#[tokio::test]
async fn order_moves_through_kitchen_and_delivery() {
    let mut app = TestApp::new().await;
    let (_, admin) = app.admin().await;
    let (_, customer) = app.customer("hungry@example.com").await;
    let (driver, driver_token) = app
        .user_with_role(UserRole::Delivery, "driver@example.com")
        .await;
    let (_, other_driver) = app
        .user_with_role(UserRole::Delivery, "other-driver@example.com")
        .await;
    let order_id = place_order(&app, &customer).await;

    // Skipping a step is not allowed
    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/admin/orders/{}/status", order_id),
            Some(json!({ "status": "delivered" })),
            Caller::bearer(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    for status in ["confirmed", "preparing"] {
        let response = app
            .request(
                Method::PUT,
                &format!("/api/v1/admin/orders/{}/status", order_id),
                Some(json!({ "status": status })),
                Caller::bearer(&admin),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK, "{}", status);
    }

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/admin/orders/{}/assign", order_id),
            Some(json!({ "delivery_person_id": driver.id })),
            Caller::bearer(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.get("/api/v1/delivery/orders", Caller::bearer(&driver_token)).await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["items"][0]["id"], order_id.as_str());

    // Another driver cannot touch it
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/delivery/orders/{}/start", order_id),
            None,
            Caller::bearer(&other_driver),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    for (step, status) in [("start", "out_for_delivery"), ("complete", "delivered")] {
        let response = app
            .request(
                Method::POST,
                &format!("/api/v1/delivery/orders/{}/{}", order_id, step),
                None,
                Caller::bearer(&driver_token),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK, "{}", step);
        let body = response_json(response).await;
        assert_eq!(body["data"]["status"], status);
    }

    let response = app
        .get(&format!("/api/v1/orders/{}", order_id), Caller::bearer(&customer))
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "delivered");
    assert!(!body["data"]["delivered_at"].is_null());

    let response = app.get("/api/v1/dashboard/delivery", Caller::bearer(&driver_token)).await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["completed_total"], 1);
    assert_eq!(body["data"]["active_orders"], 0);
}

#[tokio::test]
async fn only_delivery_staff_can_be_assigned() {
    let mut app = TestApp::new().await;
    let (_, admin) = app.admin().await;
    let (customer, customer_token) = app.customer("not-a-driver@example.com").await;
    let order_id = place_order(&app, &customer_token).await;

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/admin/orders/{}/assign", order_id),
            Some(json!({ "delivery_person_id": customer.id })),
            Caller::bearer(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
