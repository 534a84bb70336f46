mod common;

use axum::http::{Method, StatusCode};
use common::{response_json, Caller, TestApp};
use serde_json::{json, Value};

async fn publish_post(app: &mut TestApp, title: &str, publish: bool) -> Value {
    let (_, admin) = app.admin().await;
    let response = app
        .post(
            "/api/v1/admin/blog/posts",
            json!({ "title": title, "content": "Seasonal menu notes", "publish": publish }),
            Caller::bearer(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    response_json(response).await["data"].clone()
}

#[tokio::test]
async fn published_posts_are_readable_by_slug() {
    let mut app = TestApp::new().await;
    let post = publish_post(&mut app, "Winter Warmers!", true).await;
    assert_eq!(post["slug"], "winter-warmers");

    let response = app
        .get("/api/v1/blog/posts/winter-warmers", Caller::anonymous())
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let draft = publish_post(&mut app, "Secret Recipes", false).await;
    let response = app
        .get(
            &format!("/api/v1/blog/posts/{}", draft["slug"].as_str().unwrap_or_default()),
            Caller::anonymous(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.get("/api/v1/blog/posts", Caller::anonymous()).await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["pagination"]["total_items"], 1);
}

#[tokio::test]
async fn likes_are_idempotent_and_toggle() {
    let mut app = TestApp::new().await;
    let post = publish_post(&mut app, "Soup Season", true).await;
    let id = post["id"].as_str().expect("post id").to_string();
    let (_, reader) = app.customer("reader@example.com").await;
    let like_uri = format!("/api/v1/blog/posts/{}/like", id);

    for _ in 0..2 {
        let response = app
            .request(Method::POST, &like_uri, None, Caller::bearer(&reader))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert_eq!(body["data"]["liked"], true);
        assert_eq!(body["data"]["likes_count"], 1);
    }

    let response = app
        .request(
            Method::POST,
            &format!("{}/toggle", like_uri),
            None,
            Caller::bearer(&reader),
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["liked"], false);
    assert_eq!(body["data"]["likes_count"], 0);

    let response = app
        .request(Method::DELETE, &like_uri, None, Caller::bearer(&reader))
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["likes_count"], 0);

    // Anonymous readers cannot like
    let response = app
        .request(Method::POST, &like_uri, None, Caller::anonymous())
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn simultaneous_likes_leave_one_row() {
    let mut app = TestApp::new().await;
    let post = publish_post(&mut app, "Pudding Club", true).await;
    let (_, reader) = app.customer("eager@example.com").await;
    let like_uri = format!("/api/v1/blog/posts/{}/like", post["id"].as_str().expect("post id"));

    let (first, second) = tokio::join!(
        app.request(Method::POST, &like_uri, None, Caller::bearer(&reader)),
        app.request(Method::POST, &like_uri, None, Caller::bearer(&reader)),
    );
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::OK);

    let response = app
        .get(
            &format!("/api/v1/blog/posts/{}", post["slug"].as_str().expect("slug")),
            Caller::anonymous(),
        )
        .await;
    assert_eq!(response_json(response).await["data"]["likes_count"], 1);
}

#[tokio::test]
async fn blank_titles_are_rejected() {
    let mut app = TestApp::new().await;
    let (_, admin) = app.admin().await;
    let response = app
        .post(
            "/api/v1/admin/blog/posts",
            json!({ "title": "   ", "content": "Body" }),
            Caller::bearer(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response_json(response).await["success"], false);
}

#[tokio::test]
async fn comments_update_the_post_counter() {
    let mut app = TestApp::new().await;
    let post = publish_post(&mut app, "Meet the Drivers", true).await;
    let id = post["id"].as_str().expect("post id").to_string();
    let slug = post["slug"].as_str().expect("slug").to_string();
    let (_, reader) = app.customer("commenter@example.com").await;
    let comments_uri = format!("/api/v1/blog/posts/{}/comments", id);

    let response = app
        .post(&comments_uri, json!({ "body": "   " }), Caller::bearer(&reader))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post(
            &comments_uri,
            json!({ "body": "Thanks for the hot meals!" }),
            Caller::bearer(&reader),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app.get(&comments_uri, Caller::anonymous()).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["items"][0]["body"], "Thanks for the hot meals!");
    assert_eq!(body["data"]["items"][0]["author_name"], "Test customer");

    let response = app
        .get(&format!("/api/v1/blog/posts/{}", slug), Caller::anonymous())
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["comments_count"], 1);
}

#[tokio::test]
async fn chat_dedupes_by_client_token_and_polls_incrementally() {
    let mut app = TestApp::new().await;
    let (_, admin) = app.admin().await;
    let (customer, token) = app.customer("chatty@example.com").await;

    let payload = json!({ "body": "Where is my lunch?", "client_token": "msg-1" });
    let first = app
        .post("/api/v1/chat/messages", payload.clone(), Caller::bearer(&token))
        .await;
    assert_eq!(first.status(), StatusCode::CREATED);
    let first = response_json(first).await;

    let again = app
        .post("/api/v1/chat/messages", payload, Caller::bearer(&token))
        .await;
    assert_eq!(again.status(), StatusCode::OK);
    let again = response_json(again).await;
    assert_eq!(again["data"]["id"], first["data"]["id"]);

    let response = app
        .get("/api/v1/admin/chat/conversations", Caller::bearer(&admin))
        .await;
    let body = response_json(response).await;
    let threads = body["data"].as_array().expect("threads");
    assert_eq!(threads.len(), 1);
    assert_eq!(threads[0]["customer_id"], customer.id.to_string());
    assert_eq!(threads[0]["unread_count"], 1);

    let response = app
        .post(
            &format!("/api/v1/admin/chat/{}/messages", customer.id),
            json!({ "body": "Your driver is five minutes away" }),
            Caller::bearer(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/admin/chat/{}/read", customer.id),
            None,
            Caller::bearer(&admin),
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["marked_read"], 1);

    // Polling from the first message only returns the reply
    let since = first["data"]["created_at"]
        .as_str()
        .expect("timestamp")
        .replace("+00:00", "Z");
    let response = app
        .get(
            &format!("/api/v1/chat/messages?since={}", since),
            Caller::bearer(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let messages = body["data"].as_array().expect("messages");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["sender_role"], "admin");

    let response = app.get("/api/v1/chat/messages", Caller::bearer(&token)).await;
    let body = response_json(response).await;
    let messages = body["data"].as_array().expect("messages");
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|m| m["is_read"] == true || m["sender_role"] == "customer"));
}

#[tokio::test]
async fn chat_rejects_empty_messages() {
    let app = TestApp::new().await;
    let (_, token) = app.customer("silent@example.com").await;
    let response = app
        .post("/api/v1/chat/messages", json!({ "body": "" }), Caller::bearer(&token))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn polling_only_marks_returned_replies_read() {
    let mut app = TestApp::new().await;
    let (_, admin) = app.admin().await;
    let (customer, token) = app.customer("patient@example.com").await;

    let response = app
        .post("/api/v1/chat/messages", json!({ "body": "Hello?" }), Caller::bearer(&token))
        .await;
    let since = response_json(response).await["data"]["created_at"]
        .as_str()
        .expect("timestamp")
        .replace("+00:00", "Z");

    for body in ["One moment", "Checking now", "Found it"] {
        let response = app
            .post(
                &format!("/api/v1/admin/chat/{}/messages", customer.id),
                json!({ "body": body }),
                Caller::bearer(&admin),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = app
        .get(
            &format!("/api/v1/chat/messages?since={}&limit=1", since),
            Caller::bearer(&token),
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["data"][0]["body"], "One moment");

    // Read flags in the response reflect the state before this poll
    let response = app
        .get(&format!("/api/v1/chat/messages?since={}", since), Caller::bearer(&token))
        .await;
    let body = response_json(response).await;
    let read: Vec<bool> = body["data"]
        .as_array()
        .expect("messages")
        .iter()
        .map(|m| m["is_read"] == true)
        .collect();
    assert_eq!(read, vec![true, false, false]);
}
