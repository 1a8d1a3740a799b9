//! Environment-driven configuration, following the env-var `Config::default()`
//! idiom used throughout the platform's integrations crate.

use std::env;

use crate::errors::{HubError, HubResult};

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|s| matches!(s.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub mongodb_uri: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            mongodb_uri: env::var("MONGODB_URI")
                .unwrap_or_else(|_| "mongodb://localhost:27017/prhub".to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub redis_host: String,
    pub redis_port: u16,
    pub redis_password: Option<String>,
    pub worker_concurrency: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_host: env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_string()),
            redis_port: env_parsed("REDIS_PORT", 6379),
            redis_password: env_opt("REDIS_PASSWORD"),
            worker_concurrency: env_parsed("WORKER_CONCURRENCY", 5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlatformConfig {
    pub app_id: String,
    pub private_key_path: Option<String>,
    pub private_key: Option<String>,
    pub webhook_secret: Option<String>,
    pub oauth_client_id: Option<String>,
    pub oauth_client_secret: Option<String>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            app_id: env::var("PLATFORM_APP_ID").unwrap_or_default(),
            private_key_path: env_opt("PLATFORM_PRIVATE_KEY_PATH"),
            private_key: env_opt("PLATFORM_PRIVATE_KEY"),
            webhook_secret: env_opt("PLATFORM_WEBHOOK_SECRET"),
            oauth_client_id: env_opt("PLATFORM_OAUTH_CLIENT_ID"),
            oauth_client_secret: env_opt("PLATFORM_OAUTH_CLIENT_SECRET"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub api_key: Option<String>,
    pub model: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: env_opt("GENMODEL_API_KEY"),
            model: env::var("GENMODEL_MODEL").unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub enabled: bool,
    pub webhook_url: Option<String>,
    pub risk_threshold: u8,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            enabled: env_bool("CHAT_ENABLED", false),
            webhook_url: env_opt("CHAT_WEBHOOK_URL"),
            risk_threshold: env_parsed("CHAT_RISK_THRESHOLD", 60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreConfig,
    pub queue: QueueConfig,
    pub platform: PlatformConfig,
    pub model: ModelConfig,
    pub chat: ChatConfig,
    pub jwt_secret: Option<String>,
    pub frontend_base_url: String,
    pub app_base_url: String,
    pub port: u16,
    pub log_format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            queue: QueueConfig::default(),
            platform: PlatformConfig::default(),
            model: ModelConfig::default(),
            chat: ChatConfig::default(),
            jwt_secret: env_opt("JWT_SECRET"),
            frontend_base_url: env::var("FRONTEND_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            app_base_url: env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            port: env_parsed("PORT", 8080),
            log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
        }
    }
}

impl Config {
    #[must_use]
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Startup validator: asserts required vars per §6; if chat is enabled,
    /// a webhook URL must be present or the process should refuse to start.
    pub fn validate(&self) -> HubResult<()> {
        if self.platform.app_id.is_empty() {
            return Err(HubError::ConfigMissing {
                var: "PLATFORM_APP_ID".to_string(),
            });
        }
        if self.platform.private_key_path.is_none() && self.platform.private_key.is_none() {
            return Err(HubError::ConfigMissing {
                var: "PLATFORM_PRIVATE_KEY_PATH or PLATFORM_PRIVATE_KEY".to_string(),
            });
        }
        if self.platform.webhook_secret.is_none() {
            tracing::warn!(
                "PLATFORM_WEBHOOK_SECRET is not set; webhook signature verification will be bypassed (development mode only)"
            );
        }
        if self.chat.enabled && self.chat.webhook_url.is_none() {
            return Err(HubError::ConfigMissing {
                var: "CHAT_WEBHOOK_URL".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    #[serial]
    fn default_chat_config_is_disabled() {
        let _guard = ENV_MUTEX.lock().unwrap();
        env::remove_var("CHAT_ENABLED");
        env::remove_var("CHAT_WEBHOOK_URL");
        let cfg = ChatConfig::default();
        assert!(!cfg.enabled);
        assert_eq!(cfg.risk_threshold, 60);
    }

    #[test]
    #[serial]
    fn chat_enabled_without_webhook_fails_validation() {
        let _guard = ENV_MUTEX.lock().unwrap();
        env::set_var("CHAT_ENABLED", "true");
        env::remove_var("CHAT_WEBHOOK_URL");
        env::set_var("PLATFORM_APP_ID", "123");
        env::set_var("PLATFORM_PRIVATE_KEY", "dummy");

        let cfg = Config::from_env();
        let result = cfg.validate();

        env::remove_var("CHAT_ENABLED");
        env::remove_var("PLATFORM_APP_ID");
        env::remove_var("PLATFORM_PRIVATE_KEY");

        assert!(matches!(result, Err(HubError::ConfigMissing { .. })));
    }

    #[test]
    #[serial]
    fn missing_app_id_fails_validation() {
        let _guard = ENV_MUTEX.lock().unwrap();
        env::remove_var("PLATFORM_APP_ID");
        env::remove_var("PLATFORM_PRIVATE_KEY");
        env::remove_var("PLATFORM_PRIVATE_KEY_PATH");

        let cfg = Config::from_env();
        assert!(matches!(
            cfg.validate(),
            Err(HubError::ConfigMissing { var }) if var == "PLATFORM_APP_ID"
        ));
    }

    #[test]
    #[serial]
    fn queue_config_reads_redis_host() {
        let _guard = ENV_MUTEX.lock().unwrap();
        env::set_var("REDIS_HOST", "redis.internal");
        let cfg = QueueConfig::default();
        env::remove_var("REDIS_HOST");
        assert_eq!(cfg.redis_host, "redis.internal");
    }
}
