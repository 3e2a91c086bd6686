//! Environment variable handling.

use std::env;

/// Get an environment variable, returning None if not set or empty.
pub fn get_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable as a u16 (e.g., for ports).
pub fn get_u16(name: &str) -> Option<u16> {
    get_var(name).and_then(|v| v.trim().parse().ok())
}

/// Environment variable names read by ChatsApp.
pub mod vars {
    /// ChatsApp home directory override.
    pub const CHATSAPP_HOME: &str = "CHATSAPP_HOME";

    /// ChatsApp config file override.
    pub const CHATSAPP_CONFIG: &str = "CHATSAPP_CONFIG";

    /// Gateway port override.
    pub const CHATSAPP_PORT: &str = "CHATSAPP_PORT";

    /// Account service endpoint override.
    pub const CHATSAPP_ACCOUNT_URL: &str = "CHATSAPP_ACCOUNT_URL";

    /// Chat service endpoint override, applied to both direct and group chat.
    pub const CHATSAPP_CHAT_URL: &str = "CHATSAPP_CHAT_URL";
}
