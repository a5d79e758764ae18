//! Application configuration
//!
//! Centralized configuration management using the `config` crate.
//! Values come from defaults, optional config files, and `CLUBPAY__*`
//! environment variables, in that order of precedence.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub billing: BillingConfig,
}

/// HTTP server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl ServerConfig {
    /// Time a client has to send request headers before the connection drops
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9002
}

fn default_workers() -> usize {
    num_cpus::get()
}

fn default_timeout() -> u64 {
    30
}

/// Database configuration
///
/// When `url` is absent the server runs against the in-memory store.
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: Option<String>,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection acquire timeout in seconds
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Apply embedded migrations at startup
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_acquire_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_run_migrations() -> bool {
    true
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            run_migrations: default_run_migrations(),
        }
    }
}

/// Settlement-specific configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BillingConfig {
    /// Per-member amounts are rounded up to a multiple of this unit
    #[serde(default = "default_rounding_unit")]
    pub rounding_unit: i64,

    /// Suffix appended to every rendered amount
    #[serde(default = "default_currency_unit")]
    pub currency_unit: String,

    /// First line of the billing message
    #[serde(default = "default_message_header")]
    pub message_header: String,

    /// Buffered change events per subscriber before it starts lagging
    #[serde(default = "default_feed_capacity")]
    pub feed_capacity: usize,
}

fn default_rounding_unit() -> i64 {
    1000
}

fn default_currency_unit() -> String {
    "원".to_string()
}

fn default_message_header() -> String {
    "[모임 정산 안내]".to_string()
}

fn default_feed_capacity() -> usize {
    64
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            rounding_unit: default_rounding_unit(),
            currency_unit: default_currency_unit(),
            message_header: default_message_header(),
            feed_capacity: default_feed_capacity(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 9002)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("server.timeout_secs", 30)?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.run_migrations", true)?
            .set_default("billing.rounding_unit", 1000)?
            .set_default("billing.currency_unit", "원")?
            .set_default("billing.message_header", "[모임 정산 안내]")?
            .set_default("billing.feed_capacity", 64)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables with CLUBPAY_ prefix
            .add_source(
                Environment::with_prefix("CLUBPAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut app: AppConfig = config.try_deserialize()?;

        // Plain DATABASE_URL is honoured when no prefixed value was given
        if app.database.url.is_none() {
            app.database.url = env::var("DATABASE_URL").ok().filter(|u| !u.is_empty());
        }

        Ok(app)
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("CLUBPAY").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Get the server bind address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
