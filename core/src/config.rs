//! Configuration management for AI Mail

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::{MailError, MailResult};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Application settings
    #[serde(default)]
    pub app: AppConfig,
    /// Mail server endpoints
    #[serde(default)]
    pub server: ServerConfig,
    /// Sync settings
    #[serde(default)]
    pub sync: SyncConfig,
    /// Notification settings
    #[serde(default)]
    pub notifications: NotificationConfig,
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Log level
    pub log_level: String,
    /// Configuration directory
    pub config_dir: PathBuf,
    /// Data directory (persisted session lives here)
    pub data_dir: PathBuf,
}

/// Mail server endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server origin, e.g. `https://mail.example.com`
    pub base_url: String,
    /// Prefix of every REST route
    pub api_prefix: String,
    /// Path of the push socket, relative to the API prefix
    pub ws_path: String,
}

/// Sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Fixed delay between a transport drop and the next connect attempt (seconds)
    pub reconnect_delay_secs: u64,
    /// Load the mailbox as soon as a session is acquired
    pub initial_load: bool,
}

/// Notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Enable desktop notifications
    pub enable_notifications: bool,
    /// Show notification for new messages
    pub show_new_message_notifications: bool,
    /// Notification timeout (seconds)
    pub notification_timeout: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            config_dir: crate::get_config_dir().unwrap_or_else(|_| crate::fallback_dir("config")),
            data_dir: crate::get_data_dir().unwrap_or_else(|_| crate::fallback_dir("data")),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: crate::DEFAULT_SERVER_URL.to_string(),
            api_prefix: "/api".to_string(),
            ws_path: "/ws".to_string(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_secs: crate::DEFAULT_RECONNECT_DELAY_SECS,
            initial_load: true,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enable_notifications: true,
            show_new_message_notifications: true,
            notification_timeout: 5,
        }
    }
}

impl ServerConfig {
    /// Base URL of the REST API, always ending in `/`
    pub fn api_url(&self) -> MailResult<Url> {
        let base = Url::parse(&self.base_url)?;
        let prefix = self.api_prefix.trim_matches('/');
        let path = if prefix.is_empty() {
            "/".to_string()
        } else {
            format!("/{}/", prefix)
        };
        Ok(base.join(&path)?)
    }

    /// URL of the push socket, with the scheme switched to ws/wss
    pub fn ws_url(&self) -> MailResult<Url> {
        let mut url = self.api_url()?.join(self.ws_path.trim_start_matches('/'))?;
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => {
                return Err(MailError::config(format!("Unsupported URL scheme: {}", other)));
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| MailError::config("Failed to derive websocket URL"))?;
        Ok(url)
    }
}

impl SyncConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(config_path: &Path) -> MailResult<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, config_path: &Path) -> MailResult<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    /// Apply environment variable overrides on top of this configuration
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("AIMAIL_SERVER_URL") {
            self.server.base_url = url;
        }

        if let Ok(delay) = std::env::var("AIMAIL_RECONNECT_DELAY_SECONDS") {
            if let Ok(secs) = delay.parse() {
                self.sync.reconnect_delay_secs = secs;
            }
        }

        if let Ok(log_level) = std::env::var("AIMAIL_LOG_LEVEL") {
            self.app.log_level = log_level;
        }

        if let Ok(config_dir) = std::env::var("AIMAIL_CONFIG_DIR") {
            self.app.config_dir = PathBuf::from(config_dir);
        }

        if let Ok(data_dir) = std::env::var("AIMAIL_DATA_DIR") {
            self.app.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(notifications) = std::env::var("AIMAIL_SHOW_NOTIFICATIONS") {
            self.notifications.enable_notifications =
                notifications == "1" || notifications.to_lowercase() == "true";
        }

        self
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Self {
        Config::default().with_env_overrides()
    }

    /// Get the configuration file path
    pub fn config_file_path(&self) -> PathBuf {
        self.app.config_dir.join("config.toml")
    }

    /// Get the persisted session file path
    pub fn session_file_path(&self) -> PathBuf {
        self.app.data_dir.join(crate::SESSION_FILENAME)
    }

    /// Validate the configuration
    pub fn validate(&self) -> MailResult<()> {
        self.server
            .ws_url()
            .map_err(|e| MailError::config(format!("Invalid server URL {}: {}", self.server.base_url, e)))?;

        if self.sync.reconnect_delay_secs == 0 {
            return Err(MailError::config("Reconnect delay cannot be zero"));
        }

        Ok(())
    }
}
