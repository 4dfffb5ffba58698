//! Configuration management for CiteWeave services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Paper-search backend configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Job polling profiles
    #[serde(default)]
    pub polling: PollingConfig,

    /// Relationship store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Expansion controller configuration
    #[serde(default)]
    pub expansion: ExpansionConfig,

    /// Layout engine configuration
    #[serde(default)]
    pub layout: LayoutSettings,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Base URL of the paper-search backend (jobs + citation network)
    #[serde(default = "default_search_base_url")]
    pub base_url: String,

    /// API key sent as `x-api-key`
    pub api_key: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_search_timeout")]
    pub request_timeout_secs: u64,

    /// Debug/simulated environment: always use the accelerated polling profile
    #[serde(default)]
    pub simulated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct PollProfileSettings {
    /// Number of status checks before giving up
    pub max_attempts: u32,

    /// Delay before each status check in milliseconds
    pub interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollingConfig {
    /// Profile for real jobs (30 x 2s)
    #[serde(default = "default_production_profile")]
    pub production: PollProfileSettings,

    /// Accelerated profile for simulated jobs (2 x 1.5s)
    #[serde(default = "default_simulated_profile")]
    pub simulated: PollProfileSettings,

    /// Job id prefixes that mark a job as simulated
    #[serde(default = "default_simulated_prefixes")]
    pub simulated_job_prefixes: Vec<String>,
}

/// Relationship store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Redis,
    Http,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Which backend holds parent -> children relationships
    #[serde(default = "default_store_backend")]
    pub backend: StoreBackend,

    /// Redis URL (redis backend)
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Key prefix for namespacing (redis backend)
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Relationship service base URL (http backend)
    pub base_url: Option<String>,

    /// Max elapsed time for retried reads in milliseconds (http backend)
    #[serde(default = "default_store_retry_ms")]
    pub max_retry_elapsed_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExpansionConfig {
    /// A node held in `Expanding` longer than this may be re-acquired
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_secs: u64,

    /// Capacity of the completion event channel
    #[serde(default = "default_event_capacity")]
    pub event_channel_capacity: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LayoutSettings {
    /// Horizontal distance between depth levels
    #[serde(default = "default_level_spacing")]
    pub level_spacing: f64,

    /// Initial vertical distance between siblings
    #[serde(default = "default_sibling_spacing")]
    pub sibling_spacing: f64,

    /// Node glyph radius
    #[serde(default = "default_node_radius")]
    pub node_radius: f64,

    /// Minimum gap between bounding boxes
    #[serde(default = "default_layout_margin")]
    pub margin: f64,

    /// Collision resolution iteration budget
    #[serde(default = "default_layout_iterations")]
    pub max_iterations: usize,

    /// Viewport width
    #[serde(default = "default_viewport_width")]
    pub viewport_width: f64,

    /// Viewport height
    #[serde(default = "default_viewport_height")]
    pub viewport_height: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 90 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_search_base_url() -> String { "http://localhost:8000/api".to_string() }
fn default_search_timeout() -> u64 { 15 }
fn default_production_profile() -> PollProfileSettings {
    PollProfileSettings { max_attempts: 30, interval_ms: 2_000 }
}
fn default_simulated_profile() -> PollProfileSettings {
    PollProfileSettings { max_attempts: 2, interval_ms: 1_500 }
}
fn default_simulated_prefixes() -> Vec<String> { vec!["sim-".to_string(), "mock-".to_string()] }
fn default_store_backend() -> StoreBackend { StoreBackend::Memory }
fn default_redis_url() -> String { "redis://localhost:6379".to_string() }
fn default_key_prefix() -> String { "citeweave".to_string() }
fn default_store_retry_ms() -> u64 { 5_000 }
fn default_lock_timeout() -> u64 { 90 }
fn default_event_capacity() -> usize { 64 }
fn default_level_spacing() -> f64 { 260.0 }
fn default_sibling_spacing() -> f64 { 110.0 }
fn default_node_radius() -> f64 { 22.0 }
fn default_layout_margin() -> f64 { 12.0 }
fn default_layout_iterations() -> usize { 60 }
fn default_viewport_width() -> f64 { 1600.0 }
fn default_viewport_height() -> f64 { 1000.0 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "citeweave".to_string() }
fn default_rate_limit() -> u32 { 50 }
fn default_burst() -> u32 { 100 }
fn default_enabled() -> bool { true }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: default_search_base_url(),
            api_key: None,
            request_timeout_secs: default_search_timeout(),
            simulated: false,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            production: default_production_profile(),
            simulated: default_simulated_profile(),
            simulated_job_prefixes: default_simulated_prefixes(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            redis_url: default_redis_url(),
            key_prefix: default_key_prefix(),
            base_url: None,
            max_retry_elapsed_ms: default_store_retry_ms(),
        }
    }
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            lock_timeout_secs: default_lock_timeout(),
            event_channel_capacity: default_event_capacity(),
        }
    }
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            level_spacing: default_level_spacing(),
            sibling_spacing: default_sibling_spacing(),
            node_radius: default_node_radius(),
            margin: default_layout_margin(),
            max_iterations: default_layout_iterations(),
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

impl PollProfileSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Worst-case time spent polling under this profile
    pub fn budget(&self) -> Duration {
        self.interval() * self.max_attempts
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?

            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__SEARCH__SIMULATED=true
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Stale-lock timeout, never shorter than the production polling budget
    pub fn expansion_lock_timeout(&self) -> Duration {
        let configured = Duration::from_secs(self.expansion.lock_timeout_secs);
        configured.max(self.polling.production.budget())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert!(!config.search.simulated);
    }

    #[test]
    fn test_polling_profiles() {
        let config = AppConfig::default();
        assert_eq!(config.polling.production.max_attempts, 30);
        assert_eq!(config.polling.production.budget(), Duration::from_secs(60));
        assert_eq!(config.polling.simulated.max_attempts, 2);
        assert_eq!(config.polling.simulated.budget(), Duration::from_secs(3));
    }

    #[test]
    fn test_lock_timeout_covers_polling_budget() {
        let mut config = AppConfig::default();
        config.expansion.lock_timeout_secs = 5;
        assert_eq!(config.expansion_lock_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_partial_config_deserializes() {
        let config: AppConfig = serde_json::from_value(serde_json::json!({
            "store": { "backend": "redis" },
            "search": { "simulated": true }
        }))
        .unwrap();
        assert_eq!(config.store.backend, StoreBackend::Redis);
        assert_eq!(config.store.key_prefix, "citeweave");
        assert!(config.search.simulated);
        assert_eq!(config.layout.max_iterations, 60);
    }
}
