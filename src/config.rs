use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_DATABASE_DSN: &str = "sqlite://petcare.db?mode=rwc";
const DEFAULT_RPC_LISTEN_ADDRESS: &str = "0.0.0.0:50051";
const DEFAULT_HTTP_LISTEN_ADDRESS: &str = "0.0.0.0:8080";
const DEFAULT_CHECKOUT_BASE_URL: &str = "https://api-merchant.payos.vn";
const DEFAULT_CHECKOUT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_PRICING_STRATEGY: &str = "standard";
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection string (PostgreSQL or SQLite)
    #[validate(length(min = 1))]
    pub database_dsn: String,

    /// gRPC bind address (host:port)
    #[validate(custom = "validate_listen_address")]
    pub rpc_listen_address: String,

    /// HTTP bind address for health and webhook routes
    #[serde(default = "default_http_listen_address")]
    #[validate(custom = "validate_listen_address")]
    pub http_listen_address: String,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Checkout provider API root
    #[serde(default = "default_checkout_base_url")]
    pub checkout_base_url: String,

    /// Checkout provider client id (x-client-id)
    #[serde(default)]
    pub checkout_client_id: String,

    /// Checkout provider API key (x-api-key)
    #[serde(default)]
    pub checkout_api_key: String,

    /// Key used to sign link requests and verify webhook payloads
    #[serde(default)]
    pub checkout_checksum_key: String,

    /// Where the hosted page sends the customer after paying
    #[serde(default)]
    pub checkout_return_url: String,

    /// Where the hosted page sends the customer after cancelling
    #[serde(default)]
    pub checkout_cancel_url: String,

    /// Per-request timeout toward the checkout provider (seconds)
    #[serde(default = "default_checkout_timeout_secs")]
    #[validate(range(min = 1, max = 120))]
    pub checkout_timeout_secs: u64,

    /// Pricing strategy used by the booker: "standard" or "percent_off"
    #[serde(default = "default_pricing_strategy")]
    #[validate(custom = "validate_pricing_strategy")]
    pub pricing_strategy: String,

    /// Discount applied by the "percent_off" strategy
    #[serde(default)]
    #[validate(custom = "validate_discount_percent")]
    pub pricing_discount_percent: Decimal,

    /// Capacity of the in-process domain event channel
    #[serde(default = "default_event_channel_capacity")]
    #[validate(range(min = 1))]
    pub event_channel_capacity: usize,
}

impl AppConfig {
    /// Creates a new configuration
    pub fn new(database_dsn: String, rpc_listen_address: String, environment: String) -> Self {
        Self {
            database_dsn,
            rpc_listen_address,
            http_listen_address: default_http_listen_address(),
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            checkout_base_url: default_checkout_base_url(),
            checkout_client_id: String::new(),
            checkout_api_key: String::new(),
            checkout_checksum_key: String::new(),
            checkout_return_url: String::new(),
            checkout_cancel_url: String::new(),
            checkout_timeout_secs: default_checkout_timeout_secs(),
            pricing_strategy: default_pricing_strategy(),
            pricing_discount_percent: Decimal::ZERO,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    /// Gets database DSN reference
    pub fn database_dsn(&self) -> &str {
        &self.database_dsn
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Provider request timeout as a Duration
    pub fn checkout_timeout(&self) -> Duration {
        Duration::from_secs(self.checkout_timeout_secs)
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.is_development() {
            let required = [
                ("checkout_client_id", &self.checkout_client_id),
                ("checkout_api_key", &self.checkout_api_key),
                ("checkout_checksum_key", &self.checkout_checksum_key),
                ("checkout_return_url", &self.checkout_return_url),
                ("checkout_cancel_url", &self.checkout_cancel_url),
            ];
            for (field, value) in required {
                if value.trim().is_empty() {
                    let mut err = ValidationError::new("checkout_credentials_required");
                    err.message = Some(
                        format!(
                            "Set APP__{} for non-development environments",
                            field.to_ascii_uppercase()
                        )
                        .into(),
                    );
                    errors.add(field, err);
                }
            }
        }

        if self.db_min_connections > self.db_max_connections {
            let mut err = ValidationError::new("db_min_connections");
            err.message = Some("db_min_connections must not exceed db_max_connections".into());
            errors.add("db_min_connections", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_http_listen_address() -> String {
    DEFAULT_HTTP_LISTEN_ADDRESS.to_string()
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_checkout_base_url() -> String {
    DEFAULT_CHECKOUT_BASE_URL.to_string()
}
fn default_checkout_timeout_secs() -> u64 {
    DEFAULT_CHECKOUT_TIMEOUT_SECS
}
fn default_pricing_strategy() -> String {
    DEFAULT_PRICING_STRATEGY.to_string()
}
fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_listen_address(address: &str) -> Result<(), ValidationError> {
    if address.parse::<std::net::SocketAddr>().is_ok() {
        Ok(())
    } else {
        let mut err = ValidationError::new("listen_address");
        err.message = Some("Must be an IP:port socket address".into());
        Err(err)
    }
}

fn validate_pricing_strategy(value: &str) -> Result<(), ValidationError> {
    match value.to_ascii_lowercase().as_str() {
        "standard" | "percent_off" => Ok(()),
        _ => {
            let mut err = ValidationError::new("pricing_strategy");
            err.message = Some("Must be one of: standard, percent_off".into());
            Err(err)
        }
    }
}

fn validate_discount_percent(value: &Decimal) -> Result<(), ValidationError> {
    if *value >= Decimal::ZERO && *value < Decimal::ONE_HUNDRED {
        Ok(())
    } else {
        let mut err = ValidationError::new("pricing_discount_percent");
        err.message = Some("pricing_discount_percent must be in [0, 100)".into());
        Err(err)
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("petcare_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
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

    let config = Config::builder()
        .set_default("database_dsn", DEFAULT_DATABASE_DSN)?
        .set_default("rpc_listen_address", DEFAULT_RPC_LISTEN_ADDRESS)?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
