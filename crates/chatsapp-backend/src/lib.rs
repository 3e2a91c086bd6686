//! # chatsapp-backend
//!
//! Connector for the ChatsApp backend services.
//!
//! The gateway talks to three services: accounts, direct chat and group chat.
//! This crate exposes them as async traits ([`AccountService`], [`ChatService`]),
//! provides a gRPC implementation and an in-memory one, and wraps them in a
//! [`BackendConnector`] that applies deadlines and retry policy.

pub mod connector;
pub mod error;
pub mod grpc;
pub mod memory;
pub mod proto;
pub mod service;

pub use connector::{BackendConnector, DEFAULT_TIMEOUT};
pub use error::{BackendError, Rejection, Result};
pub use memory::MemoryBackend;
pub use service::{AccountService, ChatService, ReceiveCursor, SendStream};
