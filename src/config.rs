//! Configuration loader for the `codemetal-sensorflow-relay` worker.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). Endpoint URLs derived from the configured API URL
//! are computed here once, so the rest of the worker only sees final values.
//!
use std::{env, time::Duration};

use anyhow::{anyhow, Result};

use crate::auth::Credentials;
use crate::models::SchemaVersion;

/// Path suffix trimmed from `NESTJS_API_URL` to obtain the API base URL.
pub const INGEST_PATH_SUFFIX: &str = "/weather/logs";

/// Redis list the collector pushes readings onto.
pub const DEFAULT_QUEUE_NAME: &str = "weather_data_queue";

/// Per-request timeout for every outbound HTTP call.
pub const API_TIMEOUT: Duration = Duration::from_secs(10);

/// Bounded wait for a single blocking pop.
pub const QUEUE_BLOCK_TIME: Duration = Duration::from_secs(30);

/// Pause after a queue transport error before popping again.
pub const QUEUE_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Delivery attempts per receiver, first try included.
pub const RETRY_MAX_ATTEMPTS: u32 = 3;

/// Fixed pause between delivery attempts.
pub const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Parse an optional environment variable with a default value.
macro_rules! parse_env_or {
    ($var_name:expr, $ty:ty, $default:expr) => {
        env::var($var_name)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(|v| v.trim().parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Strongly typed worker configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// Redis host the queue lives on.
    pub redis_host: String,

    /// Redis port.
    pub redis_port: u16,

    /// Redis list key to pop readings from.
    pub queue_name: String,

    /// Full primary ingestion URL (readings are POSTed here).
    pub ingest_url: String,

    /// API base URL, `ingest_url` without [`INGEST_PATH_SUFFIX`].
    pub api_base_url: String,

    /// Login endpoint derived from the base URL.
    pub login_url: String,

    /// Admin credentials used for the one-shot login.
    pub credentials: Credentials,

    /// Secondary receiver, `None` when unset or empty.
    pub secondary_url: Option<String>,

    /// Reading schema this deployment consumes.
    pub schema_version: SchemaVersion,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `REDIS_HOST` – Redis host name
/// - `REDIS_PORT` – Redis port
/// - `NESTJS_API_URL` – full ingestion URL, ending in `/weather/logs`
/// - `ADMIN_EMAIL` / `ADMIN_PASSWORD` – login credentials
///
/// Optional:
/// - `AI_SERVICE_URL` – secondary receiver (disabled when empty)
/// - `QUEUE_NAME` – Redis list key (default: `weather_data_queue`)
/// - `SENSOR_SCHEMA_VERSION` – `v1` or `v2` (default: `v1`)
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let redis_host = require_env!("REDIS_HOST");
    let redis_port = require_env!("REDIS_PORT")
        .trim()
        .parse::<u16>()
        .map_err(|e| anyhow!("Invalid REDIS_PORT: {}", e))?;
    let ingest_url = require_env!("NESTJS_API_URL");
    let email = require_env!("ADMIN_EMAIL");
    let password = require_env!("ADMIN_PASSWORD");

    let queue_name = parse_env_or!("QUEUE_NAME", String, DEFAULT_QUEUE_NAME.to_string());
    let schema_version = parse_env_or!("SENSOR_SCHEMA_VERSION", SchemaVersion, SchemaVersion::V1);
    let secondary_url = env::var("AI_SERVICE_URL")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    Ok(Config::new(
        redis_host,
        redis_port,
        queue_name,
        ingest_url,
        Credentials::new(email, password),
        secondary_url,
        schema_version,
    ))
}

impl Config {
    // ---
    /// Assemble a config, deriving the API base and login URLs from `ingest_url`.
    pub fn new(
        redis_host: String,
        redis_port: u16,
        queue_name: String,
        ingest_url: String,
        credentials: Credentials,
        secondary_url: Option<String>,
        schema_version: SchemaVersion,
    ) -> Self {
        // ---
        let api_base_url = api_base_url(&ingest_url).to_string();
        let login_url = format!("{}/auth/login", api_base_url);

        Config {
            redis_host,
            redis_port,
            queue_name,
            ingest_url,
            api_base_url,
            login_url,
            credentials,
            secondary_url,
            schema_version,
        }
    }

    /// Connection URL for the Redis client.
    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}/", self.redis_host, self.redis_port)
    }

    /// Log the loaded configuration for debugging purposes.
    ///
    /// The admin password is masked; everything else is shown as loaded.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  REDIS          : {}:{}", self.redis_host, self.redis_port);
        tracing::info!("  QUEUE_NAME     : {}", self.queue_name);
        tracing::info!("  NESTJS_API_URL : {}", self.ingest_url);
        tracing::info!("  API_BASE_URL   : {}", self.api_base_url);
        tracing::info!("  LOGIN_URL      : {}", self.login_url);
        tracing::info!("  ADMIN_EMAIL    : {}", self.credentials.email);
        tracing::info!("  ADMIN_PASSWORD : ****");
        tracing::info!(
            "  AI_SERVICE_URL : {}",
            self.secondary_url.as_deref().unwrap_or("(disabled)")
        );
        tracing::info!("  SCHEMA_VERSION : {}", self.schema_version);
    }
}

/// Strip [`INGEST_PATH_SUFFIX`] from the configured URL, if present.
pub fn api_base_url(ingest_url: &str) -> &str {
    ingest_url
        .strip_suffix(INGEST_PATH_SUFFIX)
        .unwrap_or(ingest_url)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn config_for(url: &str) -> Config {
        Config::new(
            "localhost".to_string(),
            6379,
            DEFAULT_QUEUE_NAME.to_string(),
            url.to_string(),
            Credentials::new("admin@example.com".to_string(), "secret".to_string()),
            None,
            SchemaVersion::V1,
        )
    }

    #[test]
    fn test_login_url_derived_from_ingest_url() {
        // ---
        let cfg = config_for("http://api:3000/weather/logs");

        assert_eq!(cfg.api_base_url, "http://api:3000");
        assert_eq!(cfg.login_url, "http://api:3000/auth/login");
        assert_eq!(cfg.ingest_url, "http://api:3000/weather/logs");
    }

    #[test]
    fn test_url_without_suffix_is_kept() {
        // ---
        let cfg = config_for("http://api:3000/api");

        assert_eq!(cfg.api_base_url, "http://api:3000/api");
        assert_eq!(cfg.login_url, "http://api:3000/api/auth/login");
    }

    #[test]
    fn test_only_trailing_suffix_is_trimmed() {
        // ---
        assert_eq!(
            api_base_url("http://api/weather/logs/weather/logs"),
            "http://api/weather/logs"
        );
        assert_eq!(api_base_url("http://api/weather/logs/x"), "http://api/weather/logs/x");
    }

    #[test]
    fn test_redis_url() {
        // ---
        let cfg = config_for("http://api:3000/weather/logs");
        assert_eq!(cfg.redis_url(), "redis://localhost:6379/");
    }

    const REQUIRED: [(&str, Option<&str>); 5] = [
        ("REDIS_HOST", Some("redis")),
        ("REDIS_PORT", Some("6379")),
        ("NESTJS_API_URL", Some("http://api:3000/weather/logs")),
        ("ADMIN_EMAIL", Some("admin@example.com")),
        ("ADMIN_PASSWORD", Some("secret")),
    ];

    fn with_env<R>(extra: &[(&str, Option<&str>)], f: impl FnOnce() -> R) -> R {
        // ---
        let mut vars: Vec<(&str, Option<&str>)> = vec![
            ("AI_SERVICE_URL", None),
            ("QUEUE_NAME", None),
            ("SENSOR_SCHEMA_VERSION", None),
        ];
        vars.extend_from_slice(&REQUIRED);
        for (key, value) in extra {
            vars.retain(|(k, _)| k != key);
            vars.push((*key, *value));
        }
        temp_env::with_vars(vars, f)
    }

    #[test]
    fn test_load_defaults() {
        // ---
        let cfg = with_env(&[], load_from_env).unwrap();

        assert_eq!(cfg.redis_url(), "redis://redis:6379/");
        assert_eq!(cfg.queue_name, DEFAULT_QUEUE_NAME);
        assert_eq!(cfg.login_url, "http://api:3000/auth/login");
        assert_eq!(cfg.schema_version, SchemaVersion::V1);
        assert!(cfg.secondary_url.is_none());
    }

    #[test]
    fn test_load_optional_values() {
        // ---
        let cfg = with_env(
            &[
                ("AI_SERVICE_URL", Some(" http://ai:8000/predict ")),
                ("QUEUE_NAME", Some("readings")),
                ("SENSOR_SCHEMA_VERSION", Some("v2")),
            ],
            load_from_env,
        )
        .unwrap();

        assert_eq!(cfg.secondary_url.as_deref(), Some("http://ai:8000/predict"));
        assert_eq!(cfg.queue_name, "readings");
        assert_eq!(cfg.schema_version, SchemaVersion::V2);
    }

    #[test]
    fn test_blank_secondary_url_disables_it() {
        // ---
        let cfg = with_env(&[("AI_SERVICE_URL", Some("   "))], load_from_env).unwrap();
        assert!(cfg.secondary_url.is_none());
    }

    #[test]
    fn test_missing_required_variable_is_fatal() {
        // ---
        let err = with_env(&[("ADMIN_PASSWORD", None)], load_from_env).unwrap_err();
        assert!(err.to_string().contains("ADMIN_PASSWORD"));

        let err = with_env(&[("NESTJS_API_URL", Some(""))], load_from_env).unwrap_err();
        assert!(err.to_string().contains("NESTJS_API_URL"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        // ---
        let err = with_env(&[("REDIS_PORT", Some("not-a-port"))], load_from_env).unwrap_err();
        assert!(err.to_string().contains("REDIS_PORT"));

        let err = with_env(&[("SENSOR_SCHEMA_VERSION", Some("v9"))], load_from_env).unwrap_err();
        assert!(err.to_string().contains("SENSOR_SCHEMA_VERSION"));
    }
}
