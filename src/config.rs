//! Configuration management for Trellis.
//!
//! Loads configuration from environment variables (and an optional `.env`
//! file) once at startup.

use std::env;
use std::sync::OnceLock;
use std::time::Duration;

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration
pub fn config() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Initialize configuration (call once at startup)
pub fn init() -> &'static Config {
    config()
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub fields: FieldsConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

/// Tuning for derived-field computation.
#[derive(Debug, Clone)]
pub struct FieldsConfig {
    /// How long a computed rollup stays servable from its cache columns.
    pub rollup_cache_ttl: Duration,
    /// Serialize concurrent recomputes of the same rollup field.
    pub rollup_single_flight: bool,
    /// Default cap for `comma_list` lookups without an explicit `maxItems`.
    pub lookup_default_max_items: usize,
}

impl Default for FieldsConfig {
    fn default() -> Self {
        Self {
            rollup_cache_ttl: Duration::from_secs(DEFAULT_ROLLUP_CACHE_TTL_SECS),
            rollup_single_flight: false,
            lookup_default_max_items: DEFAULT_LOOKUP_MAX_ITEMS,
        }
    }
}

const DEFAULT_ROLLUP_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_LOOKUP_MAX_ITEMS: usize = 10;

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            server: ServerConfig {
                host: env_or("HOST", "0.0.0.0"),
                port: env_or("PORT", "8780").parse().unwrap_or(8780),
            },
            database: DatabaseConfig {
                path: env_or("DATABASE_PATH", "./data/trellis.db"),
            },
            fields: FieldsConfig {
                rollup_cache_ttl: Duration::from_secs(
                    env_or("ROLLUP_CACHE_TTL_SECS", "300")
                        .parse()
                        .unwrap_or(DEFAULT_ROLLUP_CACHE_TTL_SECS),
                ),
                rollup_single_flight: parse_bool(&env_or("ROLLUP_SINGLE_FLIGHT", "false")),
                lookup_default_max_items: env_or("LOOKUP_DEFAULT_MAX_ITEMS", "10")
                    .parse()
                    .ok()
                    .filter(|n| *n > 0)
                    .unwrap_or(DEFAULT_LOOKUP_MAX_ITEMS),
            },
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("true"));
        assert!(parse_bool(" YES "));
        assert!(parse_bool("1"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool(""));
    }

    #[test]
    fn test_fields_defaults() {
        let fields = FieldsConfig::default();
        assert_eq!(fields.rollup_cache_ttl, Duration::from_secs(300));
        assert!(!fields.rollup_single_flight);
        assert_eq!(fields.lookup_default_max_items, 10);
    }
}
