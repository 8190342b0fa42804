//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Environment (development, production)
    pub environment: String,

    /// Currency for accounts opened without one
    pub default_currency: String,

    /// Page size when a caller does not give one
    pub default_page_limit: i64,

    /// Upper bound applied to every page size
    pub max_page_limit: i64,

    /// How long a transaction waits for a row lock
    pub lock_timeout: Duration,

    /// Age after which idempotency records are purged
    pub idempotency_retention_hours: i64,

    /// Emit JSON log lines instead of human-readable ones
    pub log_json: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections: u32 =
            parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?;
        if database_max_connections == 0 {
            return Err(ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS"));
        }

        let environment = lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string());

        let default_currency = lookup("LEDGER_DEFAULT_CURRENCY")
            .unwrap_or_else(|| "USD".to_string())
            .to_ascii_uppercase();
        if default_currency.len() != 3 || !default_currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ConfigError::InvalidValue("LEDGER_DEFAULT_CURRENCY"));
        }

        let default_page_limit: i64 = parse_or(&lookup, "LEDGER_DEFAULT_PAGE_LIMIT", 50)?;
        let max_page_limit: i64 = parse_or(&lookup, "LEDGER_MAX_PAGE_LIMIT", 500)?;
        if max_page_limit <= 0 {
            return Err(ConfigError::InvalidValue("LEDGER_MAX_PAGE_LIMIT"));
        }
        if default_page_limit <= 0 || default_page_limit > max_page_limit {
            return Err(ConfigError::InvalidValue("LEDGER_DEFAULT_PAGE_LIMIT"));
        }

        let lock_timeout_ms: u64 = parse_or(&lookup, "LEDGER_LOCK_TIMEOUT_MS", 5000)?;
        if lock_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue("LEDGER_LOCK_TIMEOUT_MS"));
        }

        let idempotency_retention_hours: i64 =
            parse_or(&lookup, "IDEMPOTENCY_RETENTION_HOURS", 24)?;
        if idempotency_retention_hours <= 0 {
            return Err(ConfigError::InvalidValue("IDEMPOTENCY_RETENTION_HOURS"));
        }

        let log_json = lookup("LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        Ok(Self {
            database_url,
            database_max_connections,
            environment,
            default_currency,
            default_page_limit,
            max_page_limit,
            lock_timeout: Duration::from_millis(lock_timeout_ms),
            idempotency_retention_hours,
            log_json,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue(key)),
        None => Ok(default),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config =
            Config::from_lookup(lookup_from(&[("DATABASE_URL", "postgres://localhost/ledger")]))
                .unwrap();

        assert_eq!(config.database_max_connections, 10);
        assert_eq!(config.environment, "development");
        assert_eq!(config.default_currency, "USD");
        assert_eq!(config.default_page_limit, 50);
        assert_eq!(config.max_page_limit, 500);
        assert_eq!(config.lock_timeout, Duration::from_millis(5000));
        assert_eq!(config.idempotency_retention_hours, 24);
        assert!(!config.log_json);
        assert!(!config.is_production());
    }

    #[test]
    fn test_missing_database_url() {
        let result = Config::from_lookup(lookup_from(&[]));
        assert!(matches!(result, Err(ConfigError::MissingEnv("DATABASE_URL"))));
    }

    #[test]
    fn test_invalid_values() {
        let result = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/ledger"),
            ("LEDGER_MAX_PAGE_LIMIT", "lots"),
        ]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue("LEDGER_MAX_PAGE_LIMIT"))
        ));

        let result = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/ledger"),
            ("LEDGER_DEFAULT_PAGE_LIMIT", "900"),
        ]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue("LEDGER_DEFAULT_PAGE_LIMIT"))
        ));

        let result = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/ledger"),
            ("LEDGER_DEFAULT_CURRENCY", "EURO"),
        ]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue("LEDGER_DEFAULT_CURRENCY"))
        ));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/ledger"),
            ("ENVIRONMENT", "production"),
            ("LEDGER_DEFAULT_CURRENCY", "eur"),
            ("LEDGER_LOCK_TIMEOUT_MS", "250"),
            ("LOG_FORMAT", "JSON"),
        ]))
        .unwrap();

        assert!(config.is_production());
        assert_eq!(config.default_currency, "EUR");
        assert_eq!(config.lock_timeout, Duration::from_millis(250));
        assert!(config.log_json);
    }
}
