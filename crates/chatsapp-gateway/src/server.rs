//! HTTP gateway server.

use crate::api;
use crate::auth::{self, CookieSettings};
use crate::error::GatewayError;
use crate::relay::{StreamRelay, DEFAULT_BUFFER};
use crate::session::{SessionStore, DEFAULT_TTL};
use crate::Result;
use axum::extract::State;
use axum::http::{header, HeaderValue, Method};
use axum::middleware;
use axum::routing::{get, post};
use axum::{Json, Router};
use chatsapp_backend::BackendConnector;
use chatsapp_core::config::BindMode;
use chatsapp_core::Config;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Default gateway port.
pub const DEFAULT_PORT: u16 = 3000;

/// Runtime settings of the gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bind mode.
    pub bind: BindMode,

    /// Port number.
    pub port: u16,

    /// Origins allowed to call the API cross-origin. Empty disables CORS.
    pub cors_origins: Vec<String>,

    /// Session lifetime.
    pub session_ttl: Duration,

    /// Session cookie name.
    pub cookie_name: String,

    /// Mark cookies `Secure`.
    pub secure_cookies: bool,

    /// How often expired sessions are purged.
    pub sweep_interval: Duration,

    /// Per-stream buffer of pushed messages.
    pub relay_buffer: usize,

    /// Interval between SSE keep-alive comments.
    pub keep_alive: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: BindMode::Loopback,
            port: DEFAULT_PORT,
            cors_origins: Vec::new(),
            session_ttl: DEFAULT_TTL,
            cookie_name: "chatsapp_session".to_string(),
            secure_cookies: false,
            sweep_interval: Duration::from_secs(300),
            relay_buffer: DEFAULT_BUFFER,
            keep_alive: Duration::from_secs(15),
        }
    }
}

impl From<&Config> for GatewayConfig {
    fn from(config: &Config) -> Self {
        Self {
            bind: config.gateway.bind,
            port: config.gateway.port,
            cors_origins: config.gateway.cors_origins.clone(),
            session_ttl: Duration::from_secs(config.session.ttl_secs),
            cookie_name: config.session.cookie_name.clone(),
            secure_cookies: config.gateway.secure_cookies,
            sweep_interval: Duration::from_secs(config.session.sweep_interval_secs),
            relay_buffer: config.relay.buffer,
            keep_alive: Duration::from_secs(config.relay.keep_alive_secs),
        }
    }
}

/// Shared state handed to every handler.
pub struct GatewayState {
    /// Configuration.
    pub config: GatewayConfig,

    /// Live sessions.
    pub sessions: Arc<SessionStore>,

    /// Backend services.
    pub backend: BackendConnector,

    /// Live subscriptions.
    pub relay: Arc<StreamRelay>,

    /// Cookie attributes.
    pub cookies: CookieSettings,
}

/// The HTTP gateway.
pub struct Gateway {
    state: Arc<GatewayState>,
    shutdown: CancellationToken,
}

impl Gateway {
    /// Create a new gateway over `backend`.
    pub fn new(config: GatewayConfig, backend: BackendConnector) -> Self {
        let state = Arc::new(GatewayState {
            sessions: Arc::new(SessionStore::new(config.session_ttl)),
            relay: Arc::new(StreamRelay::new(backend.clone(), config.relay_buffer)),
            cookies: CookieSettings {
                name: config.cookie_name.clone(),
                secure: config.secure_cookies,
            },
            backend,
            config,
        });

        Self {
            state,
            shutdown: CancellationToken::new(),
        }
    }

    /// Shared state.
    pub fn state(&self) -> &Arc<GatewayState> {
        &self.state
    }

    /// Build the router.
    pub fn router(&self) -> Router {
        create_router(Arc::clone(&self.state))
    }

    /// Get the bind address.
    pub fn bind_address(&self) -> SocketAddr {
        let ip = match self.state.config.bind {
            BindMode::Loopback => [127, 0, 0, 1],
            BindMode::Lan => [0, 0, 0, 0],
        };

        SocketAddr::from((ip, self.state.config.port))
    }

    /// Run until SIGINT or SIGTERM.
    pub async fn run(&self) -> Result<()> {
        let addr = self.bind_address();

        if self.state.config.bind != BindMode::Loopback && !self.state.config.secure_cookies {
            warn!("Gateway binding to {} without secure cookies", addr);
            warn!("Session cookies will be sent over plain HTTP.");
        }

        let listener = TcpListener::bind(addr).await?;
        info!("Starting gateway server on {}", addr);

        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on `listener` until `signal` resolves, then close every stream
    /// and drain in-flight requests.
    pub async fn serve<F>(&self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let sweeper = self
            .state
            .sessions
            .spawn_sweeper(self.state.config.sweep_interval, self.shutdown.clone());

        let relay_token = self.state.relay.shutdown_token();
        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                signal.await;
                info!("Shutdown requested, closing streams");
                relay_token.cancel();
            })
            .await;

        self.shutdown.cancel();
        self.state.relay.shutdown().await;
        if let Err(e) = sweeper.await {
            warn!(error = %e, "Session sweeper ended abnormally");
        }
        info!("Gateway stopped");

        served.map_err(GatewayError::Io)
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.state.sessions.len()
    }

    /// Number of live subscriptions.
    pub fn stream_count(&self) -> usize {
        self.state.relay.active_count()
    }
}

/// Create the Axum router.
pub fn create_router(state: Arc<GatewayState>) -> Router {
    let pages = Router::new()
        .route("/", get(api::main_view))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_page_session,
        ));

    let protected = Router::new()
        .route("/api/session", get(api::session_info))
        .route("/api/messages/user/send", post(api::send_direct))
        .route("/api/messages/user/stream", get(api::stream_direct))
        .route("/api/messages/user/:user_id", get(api::direct_history))
        .route("/api/messages/group/send", post(api::send_group))
        .route("/api/messages/group/stream", get(api::stream_group))
        .route("/api/messages/group/:group_id", get(api::group_history))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_session,
        ));

    let public = Router::new()
        .route("/health", get(health_handler))
        .route("/login", get(api::login_view).post(api::login))
        .route("/register", get(api::register_view).post(api::register))
        .route("/logout", get(api::logout));

    let cors = create_cors_layer(&state.config.cors_origins);
    let mut router = public
        .merge(pages)
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if let Some(cors) = cors {
        router = router.layer(cors);
    }

    router
}

/// CORS layer for the configured origins, if any.
fn create_cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(Duration::from_secs(3600)),
    )
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<GatewayState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "sessions": state.sessions.len(),
        "streams": state.relay.active_count(),
    }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
