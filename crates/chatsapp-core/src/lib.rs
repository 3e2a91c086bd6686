//! # chatsapp-core
//!
//! Core types, configuration, and utilities for the ChatsApp gateway.
//!
//! This crate provides shared functionality used across all ChatsApp crates:
//!
//! - **Configuration**: Loading, validation, and persistence of the JSON5 config file
//! - **Types**: Identifiers, identities, rosters, and message envelopes
//! - **Utilities**: Path resolution, environment overrides, and secret handling

pub mod config;
pub mod env;
pub mod error;
pub mod paths;
pub mod secret;
pub mod types;

// Re-exports for convenience
pub use config::Config;
pub use error::{Error, Result};
pub use secret::SecretString;
pub use types::*;
