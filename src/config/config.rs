use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use log::LevelFilter;
use serde::Deserialize;

/// PostgreSQL database connection configuration.
///
/// Shared by both services:
/// - The scraper writes delegations and advances the checkpoint
/// - The web API only ever reads delegations
#[derive(Debug, Deserialize, Clone)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_pool_size() -> usize {
    16
}

/// Ingestion engine configuration.
///
/// Controls how the scraper pages through the TzKT feed and how often
/// it polls for new delegations once the backfill is complete.
#[derive(Debug, Deserialize, Clone)]
pub struct ScraperSettings {
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Checkpoint written on first start only; lets a fresh deployment skip old history
    #[serde(default)]
    pub initial_checkpoint: i64,
    #[serde(default = "default_tzkt_url")]
    pub tzkt_url: String,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Stop the run after this many seconds (reported as a deadline shutdown)
    #[serde(default)]
    pub run_timeout_secs: Option<u64>,
}

fn default_batch_size() -> u64 {
    10_000
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_tzkt_url() -> String {
    "https://api.tzkt.io".to_string()
}

fn default_http_timeout_secs() -> u64 {
    30
}

impl Default for ScraperSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            poll_interval_secs: default_poll_interval_secs(),
            initial_checkpoint: 0,
            tzkt_url: default_tzkt_url(),
            http_timeout_secs: default_http_timeout_secs(),
            run_timeout_secs: None,
        }
    }
}

impl ScraperSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }
}

/// Read API HTTP server configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct WebSettings {
    #[serde(default = "default_web_host")]
    pub host: String,
    #[serde(default = "default_web_port")]
    pub port: u16,
    /// Grace period given to in-flight requests on shutdown
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_web_host() -> String {
    "127.0.0.1".to_string()
}

fn default_web_port() -> u16 {
    8080
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

impl Default for WebSettings {
    fn default() -> Self {
        Self {
            host: default_web_host(),
            port: default_web_port(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl WebSettings {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Root application configuration.
///
/// Loaded from an optional `config.yaml` (or `.toml`/`.json`) in the working
/// directory, overridden by `DELEGATOR__SECTION__KEY` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub postgres: PostgresSettings,
    #[serde(default)]
    pub scraper: ScraperSettings,
    #[serde(default)]
    pub web: WebSettings,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(Environment::with_prefix("DELEGATOR").separator("__"))
            .build()?;

        Self::from_config(s)
    }

    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        config.try_deserialize()
    }

    /// Log level filter, falling back to `Info` for unknown names.
    pub fn log_level_filter(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or(LevelFilter::Info)
    }
}
