use config::{Config, Environment, File};
use serde::Deserialize;
use std::env;
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_TIMEOUT_SECS: u64 = 15;
const DEFAULT_CAS_RETRIES: u32 = 3;
const DEFAULT_MOVEMENT_PAGE_LIMIT: u64 = 100;
const CONFIG_DIR: &str = "config";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Remote row-store connection settings.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Project base URL (the REST root is derived from it)
    #[validate(custom = "validate_base_url")]
    pub base_url: String,

    /// Anonymous/service API key sent as `apikey` and bearer token
    #[validate(length(min = 1))]
    pub api_key: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempts for quantity compare-and-swap updates before giving up
    /// with a conflict error
    #[serde(default = "default_cas_retries")]
    pub cas_retries: u32,

    /// Page size cap when listing movement history
    #[serde(default = "default_movement_page_limit")]
    pub movement_page_limit: u64,
}

/// Application configuration with validation.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[validate]
    pub store: StoreConfig,

    /// Application environment
    #[serde(default = "default_env")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}
fn default_cas_retries() -> u32 {
    DEFAULT_CAS_RETRIES
}
fn default_movement_page_limit() -> u64 {
    DEFAULT_MOVEMENT_PAGE_LIMIT
}
fn default_env() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn validate_base_url(value: &str) -> Result<(), ValidationError> {
    url::Url::parse(value).map_err(|_| ValidationError::new("invalid_url"))?;
    Ok(())
}

/// Loads configuration from `config/default`, an optional per-environment
/// file, and `FABRICA_`-prefixed environment variables (highest precedence,
/// `__` as section separator, e.g. `FABRICA_STORE__API_KEY`).
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let environment = env::var("FABRICA_ENVIRONMENT").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let cfg = Config::builder()
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, environment)).required(false))
        .add_source(Environment::with_prefix("FABRICA").separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    app.validate()
        .map_err(|e| ConfigError::Invalid(e.to_string()))?;
    Ok(app)
}

/// Installs the global tracing subscriber. `RUST_LOG` overrides the
/// configured level; `json` switches to structured output.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("fabrica_core={}", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);
    let filter = EnvFilter::try_new(filter_directive)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}
