//! Application configuration loaded from environment variables.

use std::time::Duration;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_URL`: PostgreSQL connection string; when unset the server
///   runs on an in-memory store seeded with a demo catalog
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `10`)
/// - `GATEWAY_DELAY_MS`: simulated gateway latency (default: `1000`)
/// - `GATEWAY_TIMEOUT_MS`: gateway call timeout (default: `10000`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub gateway_delay: Duration,
    pub gateway_timeout: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// Unparseable values fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            database_max_connections: lookup("DATABASE_MAX_CONNECTIONS")
                .and_then(|n| n.parse().ok())
                .unwrap_or(defaults.database_max_connections),
            gateway_delay: parsed("GATEWAY_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.gateway_delay),
            gateway_timeout: parsed("GATEWAY_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.gateway_timeout),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            database_max_connections: 10,
            gateway_delay: checkout::SimulatedGateway::DEFAULT_DELAY,
            gateway_timeout: checkout::DEFAULT_GATEWAY_TIMEOUT,
        }
    }
}
