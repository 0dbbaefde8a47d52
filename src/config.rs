//! Runtime settings from environment variables.

use crate::error::ConfigError;
use std::time::Duration;

pub const DEFAULT_DATABASE_URL: &str = "postgres://localhost/entity_rest";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub database_url: String,
    pub bind_addr: String,
    pub max_connections: u32,
    /// How long an introspected table schema is trusted.
    pub schema_cache_ttl: Duration,
    /// Upper bound applied to `_perPage`.
    pub max_page_size: i64,
    pub max_body_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database_url: DEFAULT_DATABASE_URL.into(),
            bind_addr: DEFAULT_BIND_ADDR.into(),
            max_connections: 5,
            schema_cache_ttl: Duration::from_secs(60),
            max_page_size: 1000,
            max_body_bytes: 1024 * 1024,
        }
    }
}

impl Settings {
    /// Read `DATABASE_URL`, `BIND_ADDR`, `MAX_CONNECTIONS`, `SCHEMA_CACHE_TTL_SECS`,
    /// `MAX_PAGE_SIZE` and `MAX_BODY_BYTES`; unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Settings::default();
        Ok(Settings {
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            max_connections: parse_or(&lookup, "MAX_CONNECTIONS", defaults.max_connections)?,
            schema_cache_ttl: Duration::from_secs(parse_or(
                &lookup,
                "SCHEMA_CACHE_TTL_SECS",
                defaults.schema_cache_ttl.as_secs(),
            )?),
            max_page_size: parse_or(&lookup, "MAX_PAGE_SIZE", defaults.max_page_size)?,
            max_body_bytes: parse_or(&lookup, "MAX_BODY_BYTES", defaults.max_body_bytes)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value }),
    }
}
