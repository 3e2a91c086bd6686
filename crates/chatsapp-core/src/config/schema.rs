//! Configuration schema definitions.

use serde::{Deserialize, Serialize};

/// Main ChatsApp configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// HTTP gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Session management.
    #[serde(default)]
    pub session: SessionConfig,

    /// Backend service endpoints.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Stream relay settings.
    #[serde(default)]
    pub relay: RelayConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Bind mode.
    #[serde(default)]
    pub bind: BindMode,

    /// Port number.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed CORS origins. Empty means same-origin only.
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Mark session cookies `Secure`.
    #[serde(default)]
    pub secure_cookies: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: BindMode::default(),
            port: default_port(),
            cors_origins: Vec::new(),
            secure_cookies: false,
        }
    }
}

fn default_port() -> u16 {
    3000
}

/// Bind mode for the gateway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindMode {
    /// Bind to loopback only (127.0.0.1).
    #[default]
    Loopback,

    /// Bind to all interfaces.
    Lan,
}

/// Session configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session lifetime in seconds.
    #[serde(default = "default_session_ttl")]
    pub ttl_secs: u64,

    /// Name of the session cookie.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Interval between expired-session sweeps, in seconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl(),
            cookie_name: default_cookie_name(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_session_ttl() -> u64 {
    24 * 60 * 60
}

fn default_cookie_name() -> String {
    "chatsapp_session".to_string()
}

fn default_sweep_interval() -> u64 {
    300
}

/// Which backend implementation the gateway talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    /// Remote gRPC services.
    #[default]
    Grpc,

    /// In-process backend for local development.
    Memory,
}

/// Backend configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend mode.
    #[serde(default)]
    pub mode: BackendMode,

    /// Account service endpoint.
    #[serde(default = "default_account_url")]
    pub account_url: String,

    /// Direct chat service endpoint.
    #[serde(default = "default_chat_url")]
    pub direct_chat_url: String,

    /// Group chat service endpoint.
    #[serde(default = "default_chat_url")]
    pub group_chat_url: String,

    /// Deadline for unary calls and stream opening, in milliseconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Channel connect timeout, in milliseconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            mode: BackendMode::default(),
            account_url: default_account_url(),
            direct_chat_url: default_chat_url(),
            group_chat_url: default_chat_url(),
            request_timeout_ms: default_request_timeout(),
            connect_timeout_ms: default_connect_timeout(),
        }
    }
}

fn default_account_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_chat_url() -> String {
    "http://127.0.0.1:50051".to_string()
}

fn default_request_timeout() -> u64 {
    5_000
}

fn default_connect_timeout() -> u64 {
    2_000
}

/// Stream relay configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Per-subscription event buffer.
    #[serde(default = "default_relay_buffer")]
    pub buffer: usize,

    /// SSE keep-alive interval in seconds.
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            buffer: default_relay_buffer(),
            keep_alive_secs: default_keep_alive(),
        }
    }
}

fn default_relay_buffer() -> usize {
    16
}

fn default_keep_alive() -> u64 {
    15
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

/// Log level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}
