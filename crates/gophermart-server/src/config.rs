use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

/// Placeholder secrets that only make sense in development.
pub const PLACEHOLDER_SECRETS: &[&str] = &["dev-secret-change-me", "change-me-to-a-random-string"];

#[derive(Debug, Clone)]
pub struct Config {
    pub run_address: SocketAddr,
    pub database_uri: PathBuf,
    pub accrual_address: String,
    pub secret_key: String,
    pub token_lifetime: chrono::Duration,
    pub request_timeout: Duration,
    pub backoff_base: Duration,
    pub max_attempts: usize,
    pub cooldown: Duration,
    pub poll_interval: Duration,
    pub idle_interval: Duration,
    pub queue_capacity: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup; unset keys take their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            run_address: parse(&get("RUN_ADDRESS", "0.0.0.0:8080"), "RUN_ADDRESS")?,
            database_uri: get("DATABASE_URI", "gophermart.db").into(),
            accrual_address: get("ACCRUAL_SYSTEM_ADDRESS", "http://localhost:8081")
                .trim_end_matches('/')
                .to_string(),
            secret_key: get("SECRET_KEY", "dev-secret-change-me"),
            token_lifetime: chrono::Duration::hours(parse(
                &get("TOKEN_LIFETIME_HOURS", "8760"),
                "TOKEN_LIFETIME_HOURS",
            )?),
            request_timeout: Duration::from_secs(parse(
                &get("REQUEST_TIMEOUT_SECONDS", "60"),
                "REQUEST_TIMEOUT_SECONDS",
            )?),
            backoff_base: Duration::from_millis(parse(
                &get("EXP_BACKOFF_MILLIS", "100"),
                "EXP_BACKOFF_MILLIS",
            )?),
            max_attempts: parse(&get("RETRY_MAX_ATTEMPTS", "5"), "RETRY_MAX_ATTEMPTS")?,
            cooldown: Duration::from_secs(parse(
                &get("COOLDOWN_DURATION_SECONDS", "60"),
                "COOLDOWN_DURATION_SECONDS",
            )?),
            poll_interval: Duration::from_secs(parse(
                &get("POLL_INTERVAL_SECONDS", "2"),
                "POLL_INTERVAL_SECONDS",
            )?),
            idle_interval: Duration::from_secs(parse(
                &get("IDLE_INTERVAL_SECONDS", "10"),
                "IDLE_INTERVAL_SECONDS",
            )?),
            queue_capacity: parse(&get("PIPELINE_QUEUE_CAPACITY", "64"), "PIPELINE_QUEUE_CAPACITY")?,
        })
    }

    /// Endpoint prefix for per-order lookups.
    pub fn accrual_orders_url(&self) -> String {
        format!("{}/api/orders", self.accrual_address)
    }

    pub fn uses_placeholder_secret(&self) -> bool {
        self.secret_key.is_empty() || PLACEHOLDER_SECRETS.contains(&self.secret_key.as_str())
    }
}

fn parse<T>(raw: &str, key: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("invalid value for {}: '{}'", key, raw))
}
