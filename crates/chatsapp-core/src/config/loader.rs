//! Configuration loading and persistence.

use super::Config;
use crate::env;
use crate::error::ConfigError;
use crate::paths;
use std::fs;
use std::path::Path;

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = paths::config_file()?;
        Self::load(&path)
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::Json5(e.to_string()))
    }

    /// Save configuration to a file path.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_json5()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write atomically
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &content)?;
        fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Serialize to a JSON5-compatible string.
    pub fn to_json5(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Validate the configuration, collecting all errors before returning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.gateway.port == 0 {
            errors.push("Gateway port cannot be 0".to_string());
        }

        if self.session.ttl_secs == 0 {
            errors.push("Session ttl_secs must be greater than 0".to_string());
        }
        if self.session.sweep_interval_secs == 0 {
            errors.push("Session sweep_interval_secs must be greater than 0".to_string());
        }
        if !is_cookie_token(&self.session.cookie_name) {
            errors.push(format!(
                "Session cookie_name '{}' is not a valid cookie name",
                self.session.cookie_name
            ));
        }

        for (name, url) in [
            ("account_url", &self.backend.account_url),
            ("direct_chat_url", &self.backend.direct_chat_url),
            ("group_chat_url", &self.backend.group_chat_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                errors.push(format!(
                    "Backend {} '{}' must start with http:// or https://",
                    name, url
                ));
            }
        }
        if self.backend.request_timeout_ms == 0 {
            errors.push("Backend request_timeout_ms must be greater than 0".to_string());
        }
        if self.backend.connect_timeout_ms == 0 {
            errors.push("Backend connect_timeout_ms must be greater than 0".to_string());
        }

        if self.relay.buffer == 0 {
            errors.push("Relay buffer must be greater than 0".to_string());
        }
        if self.relay.keep_alive_secs == 0 {
            errors.push("Relay keep_alive_secs must be greater than 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors.join("; ")))
        }
    }

    /// Load configuration from the default path, falling back to defaults if no file exists.
    pub fn load_or_default() -> Self {
        match Self::load_default() {
            Ok(config) => config.with_env_overrides(),
            Err(ConfigError::NotFound(_)) => Self::from_env_defaults(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load config, using defaults");
                Self::from_env_defaults()
            }
        }
    }

    /// Create a Config from defaults, with environment overrides applied.
    pub fn from_env_defaults() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `CHATSAPP_PORT`, `CHATSAPP_ACCOUNT_URL` and `CHATSAPP_CHAT_URL`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(port) = env::get_u16(env::vars::CHATSAPP_PORT) {
            self.gateway.port = port;
        }
        if let Some(url) = env::get_var(env::vars::CHATSAPP_ACCOUNT_URL) {
            self.backend.account_url = url;
        }
        if let Some(url) = env::get_var(env::vars::CHATSAPP_CHAT_URL) {
            self.backend.direct_chat_url = url.clone();
            self.backend.group_chat_url = url;
        }
        self
    }
}

/// RFC 6265 token characters.
fn is_cookie_token(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendMode, BindMode, LogLevel};

    #[test]
    fn test_parse_minimal_config() {
        let config = Config::parse("{}").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_parse_json5_with_comments() {
        let content = r#"{
            // local development
            gateway: { bind: "lan", port: 8080, secure_cookies: true },
            backend: { mode: "memory" },
            logging: { level: "debug", json: true },
        }"#;
        let config = Config::parse(content).unwrap();
        assert_eq!(config.gateway.bind, BindMode::Lan);
        assert_eq!(config.gateway.port, 8080);
        assert!(config.gateway.secure_cookies);
        assert_eq!(config.backend.mode, BackendMode::Memory);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert!(config.logging.json);
        assert_eq!(config.session.cookie_name, "chatsapp_session");
    }

    #[test]
    fn test_parse_invalid() {
        let err = Config::parse("{ gateway: ").unwrap_err();
        assert!(matches!(err, ConfigError::Json5(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Path::new("/nonexistent/chatsapp.json5")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_validate_default_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_port_zero() {
        let mut config = Config::default();
        config.gateway.port = 0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("port cannot be 0"), "got: {}", err);
    }

    #[test]
    fn test_validate_bad_cookie_name() {
        let mut config = Config::default();
        config.session.cookie_name = "chats app;".to_string();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("cookie_name"), "got: {}", err);
    }

    #[test]
    fn test_validate_backend_url_scheme() {
        let mut config = Config::default();
        config.backend.group_chat_url = "localhost:50051".to_string();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("group_chat_url"), "got: {}", err);
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut config = Config::default();
        config.gateway.port = 0;
        config.session.ttl_secs = 0;
        config.relay.buffer = 0;
        config.backend.request_timeout_ms = 0;

        let err = config.validate().unwrap_err();
        match err {
            ConfigError::Validation(msg) => {
                assert_eq!(msg.split("; ").count(), 4, "got: {}", msg);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_save_writes_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("chatsapp.json5");

        let mut config = Config::default();
        config.relay.buffer = 32;
        config.save(&path).unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());
        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_cookie_token() {
        assert!(is_cookie_token("chatsapp_session"));
        assert!(!is_cookie_token(""));
        assert!(!is_cookie_token("a=b"));
        assert!(!is_cookie_token("a b"));
    }
}
