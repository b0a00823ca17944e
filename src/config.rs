use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_CURRENCY: &str = "INR";
const DEFAULT_OUTBOX_POLL_MS: u64 = 500;
const DEFAULT_OUTBOX_BATCH: u64 = 50;
const DEFAULT_GATEWAY_BASE_URL: &str = "https://api.razorpay.com";

fn validate_currency(currency: &str) -> Result<(), ValidationError> {
    if currency.len() == 3 && currency.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("currency");
        err.message = Some("Currency must be a 3-letter ISO code".into());
        Err(err)
    }
}

/// Payment gateway configuration. The key secret authenticates server-side
/// calls and signs callbacks; it must never be exposed to the browser. Only
/// `key_id` is ever returned to clients (the hosted widget needs it).
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct GatewayConfig {
    /// Public key id, sent to the hosted checkout widget
    #[validate(length(min = 1))]
    pub key_id: String,

    /// Shared secret for Basic auth and callback signatures
    #[validate(length(min = 1))]
    pub key_secret: String,

    /// Gateway API base URL
    #[serde(default = "default_gateway_base_url")]
    pub base_url: String,

    /// Settlement currency for created orders
    #[serde(default = "default_currency")]
    #[validate(custom = "validate_currency")]
    pub currency: String,
}

/// Email collaborator configuration. Delivery happens through a separate
/// sending function reached over HTTP; failures never propagate to payment
/// responses.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct EmailConfig {
    /// Endpoint of the email-sending function
    #[validate(url)]
    pub endpoint: String,

    /// Sender address for all storefront mail
    #[validate(email)]
    pub from: String,

    /// Disable outbound delivery (outbox rows still accumulate)
    #[serde(default)]
    pub disabled: bool,
}

/// Outbox worker tuning.
#[derive(Clone, Debug, Deserialize)]
pub struct OutboxConfig {
    #[serde(default = "default_outbox_poll_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_outbox_batch")]
    pub batch_size: u64,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_outbox_poll_ms(),
            batch_size: default_outbox_batch(),
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// Maximum database connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// Minimum database connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    #[validate]
    pub gateway: GatewayConfig,

    #[validate]
    pub email: EmailConfig,

    #[serde(default)]
    pub outbox: OutboxConfig,
}

impl AppConfig {
    /// Creates a minimal configuration, used by tests and local tooling.
    pub fn new(
        database_url: String,
        host: String,
        port: u16,
        environment: String,
        gateway: GatewayConfig,
        email: EmailConfig,
    ) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            gateway,
            email,
            outbox: OutboxConfig::default(),
        }
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development" || self.environment == "test"
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_gateway_base_url() -> String {
    DEFAULT_GATEWAY_BASE_URL.to_string()
}

fn default_outbox_poll_ms() -> u64 {
    DEFAULT_OUTBOX_POLL_MS
}

fn default_outbox_batch() -> u64 {
    DEFAULT_OUTBOX_BATCH
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_min_connections() -> u32 {
    1
}

/// Initializes the global tracing subscriber.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("ringshop_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::try_new(filter_directive)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    if json {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .try_init();
    }
}

/// Loads configuration from `config/default`, `config/{RUN_ENV}`, and the
/// `APP__`-prefixed environment, in that order of precedence.
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

    // NOTE: gateway credentials have no defaults - they MUST come from a
    // config file or environment variables. This prevents silently booting
    // with unauthenticated gateway access.
    let builder = Config::builder()
        .set_default("database_url", "sqlite://ringshop.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false));

    let config = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("gateway.key_secret").is_err() {
        error!("Gateway secret is not configured. Set APP__GATEWAY__KEY_SECRET or add it to config/{}.toml.", run_env);
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "gateway.key_secret is required but not configured".into(),
        )));
    }

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
            "sqlite://ringshop.db?mode=memory".into(),
            "127.0.0.1".into(),
            8080,
            "test".into(),
            GatewayConfig {
                key_id: "rzp_test_key".into(),
                key_secret: "rzp_test_secret".into(),
                base_url: default_gateway_base_url(),
                currency: default_currency(),
            },
            EmailConfig {
                endpoint: "http://127.0.0.1:9200/send".into(),
                from: "orders@ringshop.dev".into(),
                disabled: true,
            },
        )
    }

    #[test]
    fn valid_config_passes_validation() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn rejects_malformed_currency() {
        let mut cfg = base_config();
        cfg.gateway.currency = "rupees".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_non_url_email_endpoint() {
        let mut cfg = base_config();
        cfg.email.endpoint = "not a url".into();
        assert!(cfg.validate().is_err());
    }
}
