//! Shared helpers for the integration tests.

use axum::body::Body;
use axum::http::{header, Request};
use axum::response::Response;
use axum::Router;
use chatsapp_backend::{BackendConnector, MemoryBackend};
use chatsapp_gateway::{Gateway, GatewayConfig};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// Name of the session cookie under the default config.
pub const SESSION_COOKIE: &str = "chatsapp_session";

/// A gateway over the demo in-memory backend.
pub struct TestApp {
    pub gateway: Gateway,
    pub router: Router,
    pub backend: Arc<MemoryBackend>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(GatewayConfig::default()).await
    }

    pub async fn with_config(config: GatewayConfig) -> Self {
        let backend = MemoryBackend::with_demo_data().await.unwrap();
        let gateway = Gateway::new(config, BackendConnector::memory(backend.clone()));
        let router = gateway.router();
        Self {
            gateway,
            router,
            backend,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, path: &str, cookie: Option<&str>) -> Response {
        let mut builder = Request::get(path);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_form(&self, path: &str, form: &str) -> Response {
        self.send(
            Request::post(path)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(form.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn post_json(
        &self,
        path: &str,
        cookie: &str,
        body: serde_json::Value,
    ) -> Response {
        self.send(
            Request::post(path)
                .header(header::COOKIE, cookie)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    /// Log in and return the `name=value` session cookie.
    pub async fn login(&self, username: &str, password: &str) -> String {
        let response = self
            .post_form("/login", &format!("username={}&password={}", username, password))
            .await;
        set_cookie(&response, SESSION_COOKIE).expect("login did not set a session cookie")
    }
}

/// Read a JSON response body.
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// The `name=value` part of a `Set-Cookie` header for `name`, if present
/// and not a removal.
pub fn set_cookie(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .find(|pair| pair.starts_with(&format!("{}=", name)) && pair.len() > name.len() + 1)
        .map(str::to_string)
}

/// Poll `done` until it holds, failing after two seconds.
pub async fn wait_until(mut done: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
