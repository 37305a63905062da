//! Configuration loaded from `.env` and `BACKLOG_`-prefixed environment
//! variables.
//!
//! | Variable                        | Default                   |
//! |---------------------------------|---------------------------|
//! | `BACKLOG_DATABASE_URL`          | required                  |
//! | `BACKLOG_QUERY`                 | `SELECT * FROM Export_Backlogs ORDER BY idBackLog DESC` |
//! | `BACKLOG_BIND_ADDR`             | `0.0.0.0:8080`            |
//! | `BACKLOG_ROUTE_PREFIX`          | `/backlog`                |
//! | `BACKLOG_POLL_INTERVAL_SECS`    | `15`                      |
//! | `BACKLOG_QUERY_TIMEOUT_SECS`    | `10` (`0` disables)       |
//! | `BACKLOG_SUBSCRIBER_BUFFER`     | `16`                      |
//! | `BACKLOG_DELIVERY_TIMEOUT_MS`   | unset (immediate delivery)|
//! | `BACKLOG_KEEP_ALIVE_SECS`       | `15` (`0` disables)       |
//! | `BACKLOG_ALLOWED_ORIGINS`       | `*`                       |
//! | `BACKLOG_MAX_CONNECTIONS`       | `5`                       |
//!
//! `BACKLOG_ENV` selects the [`Environment`] profile.

use backlog_core::{DeliveryPolicy, DEFAULT_QUERY, DEFAULT_SUBSCRIBER_BUFFER};
use backlog_http::CorsLayer;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Prefix shared by every configuration variable
pub const ENV_PREFIX: &str = "BACKLOG_";

/// Variable selecting the environment profile
pub const ENV_PROFILE_VAR: &str = "BACKLOG_ENV";

/// Error type for configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Env(#[from] envy::Error),

    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_query")]
    pub query: String,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_route_prefix")]
    pub route_prefix: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
    #[serde(default)]
    pub delivery_timeout_ms: Option<u64>,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_query() -> String {
    DEFAULT_QUERY.to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_route_prefix() -> String {
    backlog_http::DEFAULT_PREFIX.to_string()
}

fn default_poll_interval_secs() -> u64 {
    15
}

fn default_query_timeout_secs() -> u64 {
    10
}

fn default_subscriber_buffer() -> usize {
    DEFAULT_SUBSCRIBER_BUFFER
}

fn default_keep_alive_secs() -> u64 {
    15
}

fn default_allowed_origins() -> String {
    "*".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl AppConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let config: Self = envy::prefixed(ENV_PREFIX).from_env()?;
        config.validate()
    }

    /// Load from explicit `(name, value)` pairs, names including the prefix
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: Self = envy::prefixed(ENV_PREFIX).from_iter(vars)?;
        config.validate()
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                var: format!("{}POLL_INTERVAL_SECS", ENV_PREFIX),
                reason: "must be at least 1 second".to_string(),
            });
        }
        if self.query.trim().is_empty() {
            return Err(ConfigError::Invalid {
                var: format!("{}QUERY", ENV_PREFIX),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(self)
    }

    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVar(format!("{}DATABASE_URL", ENV_PREFIX)))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.query_timeout_secs)
    }

    pub fn keep_alive(&self) -> Option<Duration> {
        non_zero_secs(self.keep_alive_secs)
    }

    pub fn delivery_policy(&self) -> DeliveryPolicy {
        match self.delivery_timeout_ms {
            Some(ms) if ms > 0 => DeliveryPolicy::Timeout(Duration::from_millis(ms)),
            _ => DeliveryPolicy::Immediate,
        }
    }

    /// `*` allows any origin, otherwise a comma-separated origin list
    pub fn cors(&self) -> CorsLayer {
        let origins = self.allowed_origins.trim();
        if origins == "*" {
            return CorsLayer::permissive();
        }
        CorsLayer::permissive().allow_origins(
            origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from),
        )
    }
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Environment profile for the service.
///
/// Detected from `BACKLOG_ENV`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    /// Verbose errors and debug logging.
    Development,
    /// Error details masked, info logging.
    Production,
    /// Custom environment name for specialized deployments.
    Custom(String),
}

impl Environment {
    /// Detect the current environment from `BACKLOG_ENV`.
    pub fn current() -> Self {
        Self::from_name(std::env::var(ENV_PROFILE_VAR).ok().as_deref())
    }

    /// - `Production` for "production" or "prod"
    /// - `Development` for "development", "dev", or no value
    /// - `Custom(name)` for any other value
    pub fn from_name(name: Option<&str>) -> Self {
        match name {
            Some("production") | Some("prod") => Self::Production,
            Some("development") | Some("dev") | None => Self::Development,
            Some(other) => Self::Custom(other.to_string()),
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Whether error bodies may carry internal details.
    pub fn show_error_details(&self) -> bool {
        !self.is_production()
    }

    /// Log filter used when `RUST_LOG` is not set.
    pub fn default_log_level(&self) -> &'static str {
        match self {
            Self::Development => "debug",
            Self::Production => "info",
            Self::Custom(_) => "info",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Load environment variables from a `.env` file, if there is one.
///
/// Existing environment variables take precedence over `.env` values.
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}

#[cfg(test)]
mod tests {
    use super::*;
    use backlog_http::AllowedOrigins;
    use proptest::prelude::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_vars(vars(&[])).unwrap();

        assert_eq!(config.query, DEFAULT_QUERY);
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.route_prefix, "/backlog");
        assert_eq!(config.poll_interval(), Duration::from_secs(15));
        assert_eq!(config.query_timeout(), Some(Duration::from_secs(10)));
        assert_eq!(config.keep_alive(), Some(Duration::from_secs(15)));
        assert_eq!(config.subscriber_buffer, 16);
        assert_eq!(config.delivery_policy(), DeliveryPolicy::Immediate);
        assert_eq!(config.cors().origins(), &AllowedOrigins::Any);
    }

    #[test]
    fn test_prefixed_overrides() {
        let config = AppConfig::from_vars(vars(&[
            ("BACKLOG_DATABASE_URL", "sqlite::memory:"),
            ("BACKLOG_POLL_INTERVAL_SECS", "5"),
            ("BACKLOG_QUERY_TIMEOUT_SECS", "0"),
            ("BACKLOG_DELIVERY_TIMEOUT_MS", "250"),
            ("BACKLOG_ALLOWED_ORIGINS", "https://a.example, https://b.example"),
            ("DATABASE_URL", "ignored"),
        ]))
        .unwrap();

        assert_eq!(config.database_url().unwrap(), "sqlite::memory:");
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.query_timeout(), None);
        assert_eq!(
            config.delivery_policy(),
            DeliveryPolicy::Timeout(Duration::from_millis(250))
        );
        assert_eq!(
            config.cors().origins(),
            &AllowedOrigins::List(vec![
                "https://a.example".to_string(),
                "https://b.example".to_string()
            ])
        );
    }

    #[test]
    fn test_missing_database_url() {
        let config = AppConfig::from_vars(vars(&[("BACKLOG_DATABASE_URL", " ")])).unwrap();
        let err = config.database_url().unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(ref v) if v == "BACKLOG_DATABASE_URL"));
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let err = AppConfig::from_vars(vars(&[("BACKLOG_POLL_INTERVAL_SECS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_unparsable_value() {
        let err = AppConfig::from_vars(vars(&[("BACKLOG_SUBSCRIBER_BUFFER", "lots")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env(_)));
    }

    #[test]
    fn test_environment_profiles() {
        assert_eq!(Environment::from_name(None), Environment::Development);
        assert_eq!(Environment::from_name(Some("prod")), Environment::Production);

        let production = Environment::from_name(Some("production"));
        assert!(!production.show_error_details());
        assert_eq!(production.default_log_level(), "info");

        let dev = Environment::from_name(Some("dev"));
        assert!(dev.show_error_details());
        assert_eq!(dev.default_log_level(), "debug");

        let staging = Environment::from_name(Some("staging"));
        assert_eq!(staging.to_string(), "staging");
        assert!(staging.show_error_details());
    }

    proptest! {
        #[test]
        fn prop_custom_environment_keeps_name(name in "[a-z]{3,12}") {
            prop_assume!(!["prod", "production", "dev", "development"].contains(&name.as_str()));
            let env = Environment::from_name(Some(&name));
            prop_assert_eq!(env.as_str(), name.as_str());
            prop_assert!(!env.is_production());
        }
    }
}
