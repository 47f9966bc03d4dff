//! Environment-driven configuration.
//!
//! Everything is read once at process start via [`Config::from_env`] and
//! passed down explicitly; nothing reads the environment after startup.

use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl Environment {
    fn parse(value: &str) -> Result<Self> {
        match value {
            "development" => Ok(Environment::Development),
            "test" => Ok(Environment::Test),
            "production" => Ok(Environment::Production),
            other => bail!("ENVIRONMENT must be development, test or production (got {other:?})"),
        }
    }

    pub fn is_production(self) -> bool {
        matches!(self, Environment::Production)
    }
}

/// Tracing exporter selection. This build wires the console (fmt) exporter;
/// `otlp` is accepted and reported as unsupported at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingExporter {
    Console,
    Otlp,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub nats_url: String,
    pub environment: Environment,
    pub port: u16,

    pub jwt_secret: String,
    pub jwt_algorithm: String,
    pub jwt_expiration_minutes: u64,
    pub webhook_secret: String,
    pub encryption_key: String,

    pub max_payload_size_mb: usize,
    pub provider_timeout: Duration,
    pub circuit_breaker_failure_threshold: u32,
    pub circuit_breaker_recovery_timeout: Duration,

    pub job_max_tries: i32,
    pub job_timeout: Duration,
    pub worker_max_jobs: usize,
    pub retry_backoff_base: Duration,
    pub retry_backoff_max: Duration,

    pub tracing_enabled: bool,
    pub tracing_exporter: TracingExporter,
    pub tracing_otlp_endpoint: Option<String>,
    pub log_level: String,
}

const MIN_PRODUCTION_SECRET_LEN: usize = 32;

impl Config {
    /// Load configuration from the environment (a `.env` file is honored in
    /// development). Fails fast on missing required values and on weak
    /// secrets in production.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let environment = Environment::parse(
            &std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        )?;

        let config = Config {
            database_url: required("DATABASE_URL")?,
            nats_url: std::env::var("NATS_URL")
                .unwrap_or_else(|_| "nats://localhost:4222".to_string()),
            environment,
            port: parse_var("PORT", 8000)?,

            jwt_secret: required("JWT_SECRET")?,
            jwt_algorithm: std::env::var("JWT_ALGORITHM").unwrap_or_else(|_| "HS256".to_string()),
            jwt_expiration_minutes: parse_var("JWT_EXPIRATION_MINUTES", 60)?,
            webhook_secret: required("WEBHOOK_SECRET")?,
            encryption_key: required("ENCRYPTION_KEY")?,

            max_payload_size_mb: parse_var("MAX_PAYLOAD_SIZE_MB", 2)?,
            provider_timeout: Duration::from_secs(parse_var("PROVIDER_TIMEOUT_SECONDS", 30)?),
            circuit_breaker_failure_threshold: parse_var("CIRCUIT_BREAKER_FAILURE_THRESHOLD", 5)?,
            circuit_breaker_recovery_timeout: Duration::from_secs(parse_var(
                "CIRCUIT_BREAKER_RECOVERY_TIMEOUT",
                60,
            )?),

            job_max_tries: parse_var("JOB_MAX_TRIES", 3)?,
            job_timeout: Duration::from_secs(parse_var("JOB_TIMEOUT_SECONDS", 300)?),
            worker_max_jobs: parse_var("WORKER_MAX_JOBS", 10)?,
            retry_backoff_base: Duration::from_secs(parse_var("RETRY_BACKOFF_BASE_SECONDS", 5)?),
            retry_backoff_max: Duration::from_secs(parse_var("RETRY_BACKOFF_MAX_SECONDS", 300)?),

            tracing_enabled: parse_var("TRACING_ENABLED", false)?,
            tracing_exporter: match std::env::var("TRACING_EXPORTER").as_deref() {
                Ok("otlp") => TracingExporter::Otlp,
                _ => TracingExporter::Console,
            },
            tracing_otlp_endpoint: std::env::var("TRACING_OTLP_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        };

        if environment.is_production() {
            for (name, value) in [
                ("JWT_SECRET", &config.jwt_secret),
                ("WEBHOOK_SECRET", &config.webhook_secret),
                ("ENCRYPTION_KEY", &config.encryption_key),
            ] {
                if value.len() < MIN_PRODUCTION_SECRET_LEN {
                    bail!("{name} must be at least {MIN_PRODUCTION_SECRET_LEN} characters in production");
                }
            }
        }

        Ok(config)
    }

    pub fn max_payload_size_bytes(&self) -> usize {
        self.max_payload_size_mb * 1024 * 1024
    }
}

fn required(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("{name} must be set"))
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw.parse().with_context(|| format!("invalid {name}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parses_known_values() {
        assert_eq!(
            Environment::parse("development").unwrap(),
            Environment::Development
        );
        assert_eq!(Environment::parse("test").unwrap(), Environment::Test);
        assert_eq!(
            Environment::parse("production").unwrap(),
            Environment::Production
        );
    }

    #[test]
    fn environment_rejects_unknown_values() {
        assert!(Environment::parse("staging").is_err());
    }

    #[test]
    fn only_production_enforces_secret_length() {
        assert!(Environment::Production.is_production());
        assert!(!Environment::Development.is_production());
    }
}
