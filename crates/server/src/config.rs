//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `ORDERFLOW_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! ## Optional
//! - `ORDERFLOW_HOST` - Bind address (default: 127.0.0.1)
//! - `ORDERFLOW_PORT` - Listen port (default: 8080)
//! - `NATS_URL` - NATS server URL (default: nats://localhost:4222)
//! - `ORDERFLOW_CLIENT_NAME` - Connection name reported to NATS (default: orderflow-server)
//! - `ORDERFLOW_STREAM` - `JetStream` stream capturing the subject (default: ORDERS)
//! - `ORDERFLOW_SUBJECT` - Subject orders are published on (default: orders)
//! - `ORDERFLOW_DURABLE_NAME` - Durable consumer name (default: durable-order-sub)
//! - `ORDERFLOW_DEAD_LETTER_SUBJECT` - Where exhausted messages go (default: `<subject>.dead`)
//! - `ORDERFLOW_MAX_DELIVER` - Delivery attempts per message (default: 5)
//! - `ORDERFLOW_RETRY_BASE_MS` - First redelivery delay in milliseconds (default: 500)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::fmt::Display;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Server application configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Durable subscription settings
    pub stream: StreamConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Settings for the durable order subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// NATS server URL
    pub url: String,
    /// Client connection name
    pub client_name: String,
    /// `JetStream` stream name
    pub stream: String,
    /// Subject orders are published on
    pub subject: String,
    /// Durable consumer name; the stream position survives restarts under it
    pub durable_name: String,
    /// Subject that receives payloads whose persistence kept failing
    pub dead_letter_subject: String,
    /// Delivery attempts before a message is dead-lettered
    pub max_deliver: i64,
    /// Delay before the first redelivery; doubles on each attempt
    pub retry_base: Duration,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the database URL is missing or any value
    /// fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("ORDERFLOW_DATABASE_URL")?;
        let host = get_parsed_or_default::<IpAddr>("ORDERFLOW_HOST", "127.0.0.1")?;
        let port = get_parsed_or_default::<u16>("ORDERFLOW_PORT", "8080")?;
        let stream = StreamConfig::from_env()?;

        Ok(Self {
            database_url,
            host,
            port,
            stream,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl StreamConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let subject = get_env_or_default("ORDERFLOW_SUBJECT", "orders");
        let dead_letter_subject = get_optional_env("ORDERFLOW_DEAD_LETTER_SUBJECT")
            .unwrap_or_else(|| default_dead_letter_subject(&subject));

        let max_deliver = get_parsed_or_default::<i64>("ORDERFLOW_MAX_DELIVER", "5")?;
        if max_deliver < 1 {
            return Err(ConfigError::InvalidEnvVar(
                "ORDERFLOW_MAX_DELIVER".to_owned(),
                "must be at least 1".to_owned(),
            ));
        }
        let retry_base_ms = get_parsed_or_default::<u64>("ORDERFLOW_RETRY_BASE_MS", "500")?;

        Ok(Self {
            url: get_env_or_default("NATS_URL", "nats://localhost:4222"),
            client_name: get_env_or_default("ORDERFLOW_CLIENT_NAME", "orderflow-server"),
            stream: get_env_or_default("ORDERFLOW_STREAM", "ORDERS"),
            subject,
            durable_name: get_env_or_default("ORDERFLOW_DURABLE_NAME", "durable-order-sub"),
            dead_letter_subject,
            max_deliver,
            retry_base: Duration::from_millis(retry_base_ms),
        })
    }
}

/// Dead-letter subject used when none is configured.
#[must_use]
pub fn default_dead_letter_subject(subject: &str) -> String {
    format!("{subject}.dead")
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get an environment variable (or its default) parsed into `T`.
fn get_parsed_or_default<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    parse_value(key, &get_env_or_default(key, default))
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}
