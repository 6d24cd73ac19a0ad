//! Application configuration structs
//!
//! Loads configuration from environment variables (and a `.env` file if present).

use serde::Deserialize;
use std::env;
use std::path::PathBuf;

/// AES-256 key length; the webhook encrypt key is NUL-padded up to this size
const MAX_ENCRYPT_KEY_LEN: usize = 32;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app: AppSettings,
    pub api: ApiConfig,
    pub mode: TransportMode,
    pub gateway: GatewaySocketConfig,
    pub webhook: WebhookConfig,
}

/// General application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_env")]
    pub env: Environment,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

/// How frames reach the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Outbound persistent socket owned by the client
    #[default]
    WebSocket,
    /// Inbound HTTP push from the platform
    Webhook,
}

impl TransportMode {
    fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "websocket" | "ws" => Some(Self::WebSocket),
            "webhook" => Some(Self::Webhook),
            _ => None,
        }
    }
}

/// REST API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_base")]
    pub base_url: String,
    pub token: String,
}

/// Outbound socket configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySocketConfig {
    /// Ask the gateway for DEFLATE-compressed frames
    #[serde(default = "default_true")]
    pub compress: bool,
}

/// Inbound webhook configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_webhook_port")]
    pub port: u16,
    #[serde(default)]
    pub route: Option<String>,
    #[serde(default)]
    pub verify_token: Option<String>,
    #[serde(default)]
    pub encrypt_key: Option<String>,
    #[serde(default = "default_true")]
    pub compress: bool,
    #[serde(default = "default_sequence_file")]
    pub sequence_file: PathBuf,
}

impl WebhookConfig {
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Route path with exactly one leading slash
    #[must_use]
    pub fn route_path(&self) -> Option<String> {
        self.route
            .as_deref()
            .map(|r| r.trim_start_matches('/'))
            .filter(|r| !r.is_empty())
            .map(|r| format!("/{r}"))
    }
}

// Default value functions
fn default_app_name() -> String {
    "kook-bot".to_string()
}

fn default_env() -> Environment {
    Environment::Development
}

fn default_api_base() -> String {
    "https://www.kookapp.cn/api/v3".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_webhook_port() -> u16 {
    8080
}

fn default_sequence_file() -> PathBuf {
    PathBuf::from("./data/sn")
}

fn default_true() -> bool {
    true
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue(name, other.to_string())),
    }
}

fn env_bool(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    env::var(name).map_or(Ok(default), |v| parse_bool(name, &v))
}

fn non_empty(name: &'static str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if required environment variables are missing or malformed
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let mode = match env::var("BOT_MODE") {
            Ok(raw) => TransportMode::parse(&raw)
                .ok_or_else(|| ConfigError::InvalidValue("BOT_MODE", raw.clone()))?,
            Err(_) => TransportMode::default(),
        };

        let webhook_port = match env::var("WEBHOOK_PORT") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| ConfigError::InvalidValue("WEBHOOK_PORT", raw.clone()))?,
            Err(_) => default_webhook_port(),
        };

        let config = Self {
            app: AppSettings {
                name: env::var("APP_NAME").unwrap_or_else(|_| default_app_name()),
                env: env::var("APP_ENV")
                    .ok()
                    .and_then(|s| match s.to_lowercase().as_str() {
                        "production" => Some(Environment::Production),
                        "staging" => Some(Environment::Staging),
                        "development" => Some(Environment::Development),
                        _ => None,
                    })
                    .unwrap_or_default(),
            },
            api: ApiConfig {
                base_url: env::var("KOOK_API_BASE").unwrap_or_else(|_| default_api_base()),
                token: non_empty("BOT_TOKEN").ok_or(ConfigError::MissingVar("BOT_TOKEN"))?,
            },
            mode,
            gateway: GatewaySocketConfig {
                compress: env_bool("GATEWAY_COMPRESS", true)?,
            },
            webhook: WebhookConfig {
                host: env::var("WEBHOOK_HOST").unwrap_or_else(|_| default_host()),
                port: webhook_port,
                route: non_empty("WEBHOOK_ROUTE"),
                verify_token: non_empty("WEBHOOK_VERIFY_TOKEN"),
                encrypt_key: non_empty("WEBHOOK_ENCRYPT_KEY"),
                compress: env_bool("WEBHOOK_COMPRESS", true)?,
                sequence_file: env::var("SEQUENCE_FILE")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| default_sequence_file()),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field requirements
    ///
    /// Webhook mode needs a route and a verify token; an encrypt key must fit an AES-256 key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(key) = &self.webhook.encrypt_key {
            if key.len() > MAX_ENCRYPT_KEY_LEN {
                return Err(ConfigError::InvalidValue(
                    "WEBHOOK_ENCRYPT_KEY",
                    format!("{} bytes (max {MAX_ENCRYPT_KEY_LEN})", key.len()),
                ));
            }
        }

        if self.mode == TransportMode::Webhook {
            if self.webhook.route_path().is_none() {
                return Err(ConfigError::MissingVar("WEBHOOK_ROUTE"));
            }
            if self.webhook.verify_token.is_none() {
                return Err(ConfigError::MissingVar("WEBHOOK_VERIFY_TOKEN"));
            }
        }

        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
