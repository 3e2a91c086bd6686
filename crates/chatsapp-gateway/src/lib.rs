//! HTTP gateway for ChatsApp.
//!
//! This crate provides:
//! - Account registration, login and logout with cookie sessions
//! - JSON endpoints for history and sending messages
//! - Server-sent event streams relaying backend pushes

pub mod api;
pub mod auth;
pub mod error;
pub mod flash;
pub mod relay;
pub mod server;
pub mod session;

pub use error::GatewayError;
pub use flash::{Flash, Notice};
pub use relay::{RelayStream, StreamHandle, StreamRelay, StreamState};
pub use server::{create_router, Gateway, GatewayConfig, GatewayState};
pub use session::{Session, SessionStore};

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
