use crate::domain::location::{default_locations, Location};
use crate::errors::{AppError, Result};
use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Environment variable accepted as a fallback for `maps.api_key`
pub const API_KEY_FALLBACK_VAR: &str = "GOOGLE_MAPS_API_KEY";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub maps: MapsConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub url: Option<String>,
    pub key_prefix: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: u64,
    pub window_seconds: u64,
    pub compact_on_write: bool,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

#[derive(Clone, Deserialize)]
pub struct MapsConfig {
    pub api_key: Option<String>,
    #[serde(default = "default_locations")]
    pub locations: Vec<Location>,
}

impl Default for MapsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            locations: default_locations(),
        }
    }
}

// Keep the key out of startup logs
impl std::fmt::Debug for MapsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapsConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("locations", &self.locations)
            .finish()
    }
}

/// Output format of the log subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Level or `EnvFilter` directives, overridden by `RUST_LOG`
    pub log_level: String,
    pub log_format: LogFormat,
    pub metrics_enabled: bool,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        // Determine environment
        let environment =
            env::var("MAP_GATEWAY_ENV").unwrap_or_else(|_| "development".to_string());

        Self::load_from("config", &environment, env::vars().collect())
    }

    /// Layer defaults, `{dir}/default`, `{dir}/{environment}` and the given
    /// variables, in increasing precedence
    pub fn load_from(
        dir: &str,
        environment: &str,
        vars: config::Map<String, String>,
    ) -> Result<Self> {
        let fallback_key = vars.get(API_KEY_FALLBACK_VAR).cloned();

        let config = Self::with_defaults()?
            .add_source(config::File::with_name(&format!("{}/default", dir)).required(false))
            .add_source(
                config::File::with_name(&format!("{}/{}", dir, environment)).required(false),
            )
            // e.g., MAP_GATEWAY__RATE_LIMIT__MAX_REQUESTS=10
            .add_source(
                config::Environment::with_prefix("MAP_GATEWAY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(vars)),
            )
            .build()?;

        let mut config: Config = config.try_deserialize()?;

        if config.maps.api_key.is_none() {
            config.maps.api_key = fallback_key;
        }

        Ok(config)
    }

    /// Parse a TOML document layered over the built-in defaults
    pub fn from_toml(source: &str) -> Result<Self> {
        let config = Self::with_defaults()?
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    fn with_defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        Ok(config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("store.backend", "redis")?
            .set_default("store.key_prefix", "ratelimit:default-app-id:")?
            .set_default("store.timeout_ms", 2000)?
            .set_default("rate_limit.max_requests", 5)?
            .set_default("rate_limit.window_seconds", 3600)?
            .set_default("rate_limit.compact_on_write", true)?
            .set_default("observability.log_level", "info")?
            .set_default("observability.log_format", "pretty")?
            .set_default("observability.metrics_enabled", true)?)
    }

    /// Validate configuration; any failure is fatal at startup
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(AppError::Configuration("Invalid port number".to_string()));
        }

        if self.rate_limit.max_requests == 0 {
            return Err(AppError::Configuration(
                "rate_limit.max_requests must be positive".to_string(),
            ));
        }

        if self.rate_limit.window_seconds == 0 {
            return Err(AppError::Configuration(
                "rate_limit.window_seconds must be positive".to_string(),
            ));
        }

        if self.store.timeout_ms == 0 {
            return Err(AppError::Configuration(
                "store.timeout_ms must be positive".to_string(),
            ));
        }

        if self.store.backend == StoreBackend::Redis
            && self.store.url.as_deref().map_or(true, str::is_empty)
        {
            return Err(AppError::ConfigurationMissing(
                "Redis URL is required".to_string(),
            ));
        }

        if self.maps.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(AppError::ConfigurationMissing(
                "Google Maps API Key not configured on server.".to_string(),
            ));
        }

        for location in &self.maps.locations {
            location.validate()?;
        }

        Ok(())
    }
}
