use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_RESERVATION_TTL_MINUTES: u64 = 20;
const DEFAULT_PAYMENT_EXPIRY_MINUTES: u64 = 30;
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;
const DEFAULT_REALTIME_CHANNEL_PREFIX: &str = "busline:trip";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Redis connection URL (realtime seat-update fan-out)
    pub redis_url: String,

    /// Host the HTTP shell binds to
    pub host: String,

    /// Port the HTTP shell binds to
    #[serde(default = "default_port")]
    pub port: u16,

    /// Deployment environment: "development", "staging", "production"
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Default log level when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit logs as JSON
    #[serde(default)]
    pub log_json: bool,

    /// Run pending migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// Comma-separated list of allowed CORS origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// How long a seat reservation is held for a pending order, in minutes.
    /// The expiry sweep itself runs as an external background job.
    #[serde(default = "default_reservation_ttl_minutes")]
    pub reservation_ttl_minutes: u64,

    /// How long an initiated payment stays payable, in minutes
    #[serde(default = "default_payment_expiry_minutes")]
    pub payment_expiry_minutes: u64,

    /// Base URL of the payment gateway
    #[validate(url(message = "payment_gateway_base_url must be a valid URL"))]
    pub payment_gateway_base_url: String,

    /// API key presented to the payment gateway
    pub payment_gateway_api_key: String,

    /// Shared secret for verifying gateway webhook signatures
    #[serde(default)]
    pub payment_webhook_secret: Option<String>,

    /// Capacity of the in-process domain event channel
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Redis channel prefix for realtime seat updates
    #[serde(default = "default_realtime_channel_prefix")]
    pub realtime_channel_prefix: String,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_reservation_ttl_minutes() -> u64 {
    DEFAULT_RESERVATION_TTL_MINUTES
}
fn default_payment_expiry_minutes() -> u64 {
    DEFAULT_PAYMENT_EXPIRY_MINUTES
}
fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}
fn default_realtime_channel_prefix() -> String {
    DEFAULT_REALTIME_CHANNEL_PREFIX.to_string()
}

impl AppConfig {
    /// Creates a new configuration, used mainly from tests
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        database_url: String,
        redis_url: String,
        host: String,
        port: u16,
        environment: String,
        payment_gateway_base_url: String,
        payment_gateway_api_key: String,
    ) -> Self {
        Self {
            database_url,
            redis_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            reservation_ttl_minutes: default_reservation_ttl_minutes(),
            payment_expiry_minutes: default_payment_expiry_minutes(),
            payment_gateway_base_url,
            payment_gateway_api_key,
            payment_webhook_secret: None,
            event_channel_capacity: default_event_channel_capacity(),
            realtime_channel_prefix: default_realtime_channel_prefix(),
        }
    }

    /// Gets database URL reference
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// Reservation hold duration for pending orders
    pub fn reservation_ttl(&self) -> Duration {
        Duration::from_secs(self.reservation_ttl_minutes * 60)
    }

    /// Payment expiry window
    pub fn payment_expiry(&self) -> Duration {
        Duration::from_secs(self.payment_expiry_minutes * 60)
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("busline_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let builder = Config::builder()
        .set_default("database_url", "sqlite://busline.db?mode=rwc")?
        .set_default("redis_url", "redis://localhost:6379")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("payment_gateway_base_url", "http://localhost:9090")?
        .set_default("payment_gateway_api_key", "dev-gateway-key")?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false));

    let config = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".to_string(),
            "redis://127.0.0.1:6379".to_string(),
            "127.0.0.1".to_string(),
            18080,
            "test".to_string(),
            "http://localhost:9090".to_string(),
            "test-key".to_string(),
        )
    }

    #[test]
    fn reservation_and_payment_windows_derive_from_minutes() {
        let cfg = base_config();
        assert_eq!(cfg.reservation_ttl(), Duration::from_secs(20 * 60));
        assert_eq!(cfg.payment_expiry(), Duration::from_secs(30 * 60));
    }

    #[test]
    fn gateway_url_is_validated() {
        let mut cfg = base_config();
        cfg.payment_gateway_base_url = "not a url".to_string();
        assert!(cfg.validate().is_err());
    }
}
