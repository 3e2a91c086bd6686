//! End-to-end HTTP flows against the in-memory backend.

use axum::http::{header, StatusCode};
use axum::response::Response;
use chrono::{DateTime, Utc};
use chatsapp_core::types::{Scope, UserId};
use chatsapp_gateway::Gateway;
use chatsapp_integration_tests::{body_json, set_cookie, wait_until, TestApp, SESSION_COOKIE};
use futures::StreamExt;
use serde_json::json;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Read SSE frames until `count` message events have arrived.
async fn read_events(response: Response, count: usize) -> (Vec<serde_json::Value>, Response) {
    let (parts, body) = response.into_parts();
    let mut stream = body.into_data_stream();
    let mut buffer = String::new();
    let mut events = Vec::new();

    while events.len() < count {
        let chunk = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("timed out waiting for event")
            .expect("stream ended")
            .unwrap();
        buffer.push_str(std::str::from_utf8(&chunk).unwrap());

        while let Some(end) = buffer.find("\n\n") {
            let frame: String = buffer.drain(..end + 2).collect();
            if !frame.contains("event: message") {
                continue;
            }
            let data = frame
                .lines()
                .find_map(|l| l.strip_prefix("data: "))
                .unwrap();
            events.push(serde_json::from_str(data).unwrap());
        }
    }

    let rest = axum::body::Body::from_stream(stream);
    (events, Response::from_parts(parts, rest))
}

#[tokio::test]
async fn test_login_identity_matches_account() {
    let app = TestApp::new().await;
    let cookie = app.login("abi", "secret").await;

    let response = app.get("/api/session", Some(cookie.as_str())).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["user"]["username"], "abi");
    assert_eq!(body["user"]["displayName"], "Abi");
    assert_eq!(body["user"]["userId"], 1);

    let contacts: Vec<_> = body["contacts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["username"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(contacts, ["bob", "carol"]);
    assert_eq!(body["groups"][0]["name"], "general");
}

#[tokio::test]
async fn test_unknown_token_is_unauthenticated() {
    let app = TestApp::new().await;
    let cookie = format!("{}={}", SESSION_COOKIE, "00".repeat(32));

    let response = app.get("/api/session", Some(cookie.as_str())).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_history_without_cookie_makes_no_backend_call() {
    let app = TestApp::new().await;
    let calls = app.backend.call_count();

    let response = app.get("/api/messages/user/123", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(app.backend.call_count(), calls);
}

#[tokio::test]
async fn test_register_then_login() {
    let app = TestApp::new().await;

    let response = app
        .post_form("/register", "username=dave&displayName=Dave&password=pw")
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[header::LOCATION], "/login");
    let flash = set_cookie(&response, "chatsapp_flash").unwrap();

    // The notice shows once on the login page.
    let body = body_json(app.get("/login", Some(flash.as_str())).await).await;
    assert_eq!(body["flash"]["message"], "Registration successful!");
    assert_eq!(body["flash"]["level"], "success");

    let response = app
        .post_form("/register", "username=dave&displayName=Again&password=pw")
        .await;
    assert_eq!(response.headers()[header::LOCATION], "/register");
    let flash = set_cookie(&response, "chatsapp_flash").unwrap();
    let body = body_json(app.get("/register", Some(flash.as_str())).await).await;
    assert_eq!(body["flash"]["message"], "Username is already taken.");

    let cookie = app.login("dave", "pw").await;
    let body = body_json(app.get("/", Some(cookie.as_str())).await).await;
    assert_eq!(body["user"]["displayName"], "Dave");
}

#[tokio::test]
async fn test_login_failures_flash() {
    let app = TestApp::new().await;

    for (form, message) in [
        ("username=nobody&password=x", "Account not found."),
        ("username=abi&password=wrong", "Wrong username or password."),
    ] {
        let response = app.post_form("/login", form).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/login");
        assert!(set_cookie(&response, SESSION_COOKIE).is_none());

        let flash = set_cookie(&response, "chatsapp_flash").unwrap();
        let body = body_json(app.get("/login", Some(flash.as_str())).await).await;
        assert_eq!(body["flash"]["message"], message);
    }
}

#[tokio::test]
async fn test_flash_observed_once() {
    let app = TestApp::new().await;
    let cookie = app.login("abi", "secret").await;

    let first = body_json(app.get("/", Some(cookie.as_str())).await).await;
    let second = body_json(app.get("/", Some(cookie.as_str())).await).await;
    assert_eq!(first["flash"]["message"], "Login successful!");
    assert!(second["flash"].is_null());
}

#[tokio::test]
async fn test_logout_destroys_session() {
    let app = TestApp::new().await;
    let cookie = app.login("abi", "secret").await;
    assert_eq!(app.gateway.session_count(), 1);

    let response = app.get("/logout", Some(cookie.as_str())).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[header::LOCATION], "/login");
    assert_eq!(app.gateway.session_count(), 0);

    let response = app.get("/", Some(cookie.as_str())).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[header::LOCATION], "/login");
}

#[tokio::test]
async fn test_direct_send_and_history() {
    let app = TestApp::new().await;
    let abi = app.login("abi", "secret").await;
    let bob = app.login("bob", "secret").await;

    let started = Utc::now();
    let response = app
        .post_json(
            "/api/messages/user/send",
            &abi,
            json!({"recipientId": 2, "message": "  hi bob  "}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    let timestamp: DateTime<Utc> = body["timestamp"].as_str().unwrap().parse().unwrap();
    assert!(timestamp >= started);

    let history = body_json(app.get("/api/messages/user/1", Some(bob.as_str())).await).await;
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["sender"]["id"], 1);
    assert_eq!(history[0]["destination"], json!({"type": "user", "id": 2}));
    assert_eq!(history[0]["scope"], "direct");
    assert_eq!(history[0]["body"], "hi bob");
}

#[tokio::test]
async fn test_send_validation() {
    let app = TestApp::new().await;
    let abi = app.login("abi", "secret").await;
    let calls = app.backend.call_count();

    for body in [
        json!({"recipientId": 2, "message": "   "}),
        json!({"recipientId": "two", "message": "hi"}),
        json!({"recipientId": 0, "message": "hi"}),
        json!({"message": "hi"}),
    ] {
        let response = app.post_json("/api/messages/user/send", &abi, body.clone()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", body);
        assert_eq!(body_json(response).await["success"], false);
    }
    assert_eq!(app.backend.call_count(), calls);
}

#[tokio::test]
async fn test_undeliverable_message() {
    let app = TestApp::new().await;
    let abi = app.login("abi", "secret").await;
    app.backend.set_failing_sends(true);

    let response = app
        .post_json(
            "/api/messages/group/send",
            &abi,
            json!({"groupId": "1", "message": "hello"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json(response).await["error"],
        "Message could not be delivered."
    );
}

#[tokio::test]
async fn test_group_history_requires_membership() {
    let app = TestApp::new().await;
    app.backend.register("dave", "Dave", "pw").await.unwrap();
    let dave = app.login("dave", "pw").await;

    let response = app.get("/api/messages/group/1", Some(dave.as_str())).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_concurrent_sends_get_their_own_ack() {
    let app = TestApp::new().await;
    let abi = app.login("abi", "secret").await;

    let (first, second) = tokio::join!(
        app.post_json(
            "/api/messages/user/send",
            &abi,
            json!({"recipientId": 2, "message": "one"}),
        ),
        app.post_json(
            "/api/messages/user/send",
            &abi,
            json!({"recipientId": 3, "message": "two"}),
        ),
    );
    assert_eq!(body_json(first).await["success"], true);
    assert_eq!(body_json(second).await["success"], true);

    let bob = app.login("bob", "secret").await;
    let history = body_json(app.get("/api/messages/user/1", Some(bob.as_str())).await).await;
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["body"], "one");
}

#[tokio::test]
async fn test_stream_relays_in_order() {
    let app = TestApp::new().await;
    let abi = app.login("abi", "secret").await;
    let bob = app.login("bob", "secret").await;

    let response = app.get("/api/messages/user/stream", Some(bob.as_str())).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );
    wait_until(|| app.backend.subscriber_count(UserId::new(2), Scope::Direct) == 1).await;

    for body in ["I1", "I2", "I3"] {
        let response = app
            .post_json(
                "/api/messages/user/send",
                &abi,
                json!({"recipientId": 2, "message": body}),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let (events, response) = read_events(response, 3).await;
    let bodies: Vec<_> = events.iter().map(|e| e["body"].clone()).collect();
    assert_eq!(bodies, [json!("I1"), json!("I2"), json!("I3")]);
    assert_eq!(events[0]["sender"], json!({"id": 1, "username": "abi"}));
    assert_eq!(events[0]["scope"], "direct");
    assert!(events[0]["sentAt"].is_string());

    // Closing the client side releases the backend subscription.
    assert_eq!(app.gateway.stream_count(), 1);
    drop(response);
    wait_until(|| app.gateway.stream_count() == 0).await;
    wait_until(|| app.backend.subscriber_count(UserId::new(2), Scope::Direct) == 0).await;
}

#[tokio::test]
async fn test_group_stream_skips_sender() {
    let app = TestApp::new().await;
    let abi = app.login("abi", "secret").await;
    let carol = app.login("carol", "secret").await;

    let carol_stream = app.get("/api/messages/group/stream", Some(carol.as_str())).await;
    wait_until(|| app.backend.subscriber_count(UserId::new(3), Scope::Group) == 1).await;

    app.post_json(
        "/api/messages/group/send",
        &abi,
        json!({"groupId": 1, "message": "hello all"}),
    )
    .await;

    let (events, _) = read_events(carol_stream, 1).await;
    assert_eq!(events[0]["destination"], json!({"type": "group", "id": 1}));
    assert_eq!(events[0]["body"], "hello all");
}

#[tokio::test]
async fn test_serve_and_graceful_shutdown() {
    let app = TestApp::new().await;
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

    let gateway: Gateway = app.gateway;
    let server = tokio::spawn(async move {
        gateway
            .serve(listener, async {
                let _ = stop_rx.await;
            })
            .await
    });

    let mut socket = tokio::net::TcpStream::connect(addr).await.unwrap();
    socket
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut raw = String::new();
    socket.read_to_string(&mut raw).await.unwrap();
    assert!(raw.starts_with("HTTP/1.1 200"), "{}", raw);
    assert!(raw.contains("\"status\":\"ok\""), "{}", raw);

    stop_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();
}
