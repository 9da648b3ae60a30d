use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, warn};

use gophermart_types::api::AccrualResponse;
use gophermart_types::models::ProcessingResult;

#[derive(Debug, Error)]
pub enum AccrualError {
    #[error("accrual service failed with {0}")]
    ServiceError(StatusCode),
    #[error("accrual service is rate limiting requests")]
    RateLimited,
    #[error("accrual service returned no data for the order")]
    EmptyOrder,
    #[error("unexpected accrual service status {0}")]
    UnexpectedStatus(StatusCode),
    #[error("invalid accrual response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("accrual service reported a negative accrual {0}")]
    NegativeAccrual(Decimal),
    #[error("accrual request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("accrual client misconfigured: {0}")]
    Config(String),
}

/// Settings for [`AccrualClient`].
#[derive(Debug, Clone)]
pub struct AccrualClientConfig {
    /// Orders are fetched from `{base_url}/{number}`.
    pub base_url: String,
    pub request_timeout: Duration,
    pub backoff_base: Duration,
    /// Total network attempts per lookup, including the first.
    pub max_attempts: usize,
    pub cooldown: Duration,
}

impl AccrualClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: Duration::from_secs(60),
            backoff_base: Duration::from_millis(100),
            max_attempts: 5,
            cooldown: Duration::from_secs(60),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }
}

/// Client for the external accrual service. Holds no per-order state and is
/// safe to share between tasks.
#[derive(Debug, Clone)]
pub struct AccrualClient {
    client: Client,
    config: AccrualClientConfig,
}

impl AccrualClient {
    pub fn new(config: AccrualClientConfig) -> Result<Self, AccrualError> {
        if config.base_url.is_empty() {
            return Err(AccrualError::Config("base url is empty".to_string()));
        }
        if config.max_attempts == 0 {
            return Err(AccrualError::Config("max attempts must be at least 1".to_string()));
        }

        let client = Client::builder().timeout(config.request_timeout).build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &AccrualClientConfig {
        &self.config
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.config.backoff_base)
            .with_max_delay(self.config.backoff_base * 32)
            .with_max_times(self.config.max_attempts - 1)
            .with_jitter()
    }

    /// Only failures below HTTP are retried here; status codes are the
    /// caller's business.
    fn is_retryable(err: &reqwest::Error) -> bool {
        err.is_connect() || err.is_timeout()
    }

    fn order_url(&self, number: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), number)
    }

    /// Look up one order.
    ///
    /// On HTTP 429 this sleeps for the configured cooldown before returning
    /// [`AccrualError::RateLimited`], so the caller's next request is throttled.
    pub async fn fetch_order(&self, number: &str) -> Result<ProcessingResult, AccrualError> {
        let url = self.order_url(number);

        let response = (|| async { self.client.get(&url).send().await })
            .retry(self.backoff())
            .when(Self::is_retryable)
            .notify(|err, delay| {
                warn!(order = %number, error = %err, ?delay, "accrual request failed, retrying");
            })
            .await?;

        let status = response.status();
        match status {
            StatusCode::OK => {
                let body = response.bytes().await?;
                if body.is_empty() {
                    return Err(AccrualError::EmptyOrder);
                }
                let parsed: AccrualResponse = serde_json::from_slice(&body)?;
                if parsed.order.is_empty() {
                    return Err(AccrualError::EmptyOrder);
                }
                if let Some(amount) = parsed.accrual.filter(|a| *a < Decimal::ZERO) {
                    return Err(AccrualError::NegativeAccrual(amount));
                }
                debug!(order = %parsed.order, status = ?parsed.status, "accrual lookup succeeded");
                Ok(ProcessingResult {
                    order_number: parsed.order,
                    status: parsed.status,
                    accrual: parsed.accrual,
                })
            }
            StatusCode::NO_CONTENT => Err(AccrualError::EmptyOrder),
            StatusCode::TOO_MANY_REQUESTS => {
                warn!(
                    order = %number,
                    cooldown = ?self.config.cooldown,
                    "accrual service rate limited, cooling down"
                );
                tokio::time::sleep(self.config.cooldown).await;
                Err(AccrualError::RateLimited)
            }
            s if s.is_server_error() => Err(AccrualError::ServiceError(s)),
            s => Err(AccrualError::UnexpectedStatus(s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = AccrualClientConfig::new("http://localhost:8081/api/orders");
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.backoff_base, Duration::from_millis(100));
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.cooldown, Duration::from_secs(60));
    }

    #[test]
    fn test_empty_base_url_fails() {
        let result = AccrualClient::new(AccrualClientConfig::new(""));
        assert!(matches!(result, Err(AccrualError::Config(_))));
    }

    #[test]
    fn test_zero_attempts_fails() {
        let config = AccrualClientConfig::new("http://localhost").with_max_attempts(0);
        assert!(matches!(AccrualClient::new(config), Err(AccrualError::Config(_))));
    }

    #[test]
    fn test_order_url_joins_cleanly() {
        let client = AccrualClient::new(AccrualClientConfig::new("http://accrual/api/orders/")).unwrap();
        assert_eq!(client.order_url("1230"), "http://accrual/api/orders/1230");
    }
}
