//! Throttled, retrying wrapper around any [`ApiClient`]
//!
//! # Retry Logic
//!
//! | Condition | Action |
//! |-----------|--------|
//! | Too many requests (code 6, HTTP 429) | Wait `rate-limit-backoff`, retry once |
//! | Flood control (code 9) | Wait `flood-control-backoff`, retry once |
//! | Network error / timeout | Retry up to `max-retries`, backoff doubles each time |
//! | Access denied / not found | Surface immediately |
//! | Any other upstream code | Surface immediately |
//!
//! Every attempt, retries included, draws from the shared [`RateLimiter`].

use crate::api::error::{ApiError, ApiResult};
use crate::api::limiter::RateLimiter;
use crate::api::{ApiClient, Params};
use crate::config::ApiConfig;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Retries granted for "too many requests" and for flood control
const THROTTLE_RETRIES: u32 = 1;

/// Timing and retry parameters for [`RateLimitedClient`]
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub call_timeout: Duration,
    pub max_network_retries: u32,
    pub rate_limit_backoff: Duration,
    pub flood_control_backoff: Duration,
    pub network_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ApiConfig) -> Self {
        Self {
            call_timeout: Duration::from_secs(config.timeout_secs),
            max_network_retries: config.max_retries,
            rate_limit_backoff: Duration::from_millis(config.rate_limit_backoff_ms),
            flood_control_backoff: Duration::from_millis(config.flood_control_backoff_ms),
            network_backoff: Duration::from_millis(config.network_backoff_ms),
        }
    }

    fn network_delay(&self, attempt: u32) -> Duration {
        self.network_backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
            max_network_retries: 3,
            rate_limit_backoff: Duration::from_secs(1),
            flood_control_backoff: Duration::from_secs(5),
            network_backoff: Duration::from_secs(1),
        }
    }
}

/// Upstream client that enforces the shared request budget and retries transient failures
pub struct RateLimitedClient<C> {
    inner: C,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
}

impl<C: ApiClient> RateLimitedClient<C> {
    /// Wraps `inner`, drawing request slots from `limiter`
    ///
    /// Pass the same limiter to every client that talks to the same upstream
    /// account so they share one budget.
    pub fn new(inner: C, limiter: Arc<RateLimiter>, policy: RetryPolicy) -> Self {
        Self {
            inner,
            limiter,
            policy,
        }
    }

    /// Builds a wrapper with its own limiter from configuration
    pub fn from_config(inner: C, config: &ApiConfig) -> Self {
        Self::new(
            inner,
            Arc::new(RateLimiter::new(config.requests_per_second)),
            RetryPolicy::from_config(config),
        )
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    async fn attempt(&self, method: &str, params: &Params) -> ApiResult<Value> {
        self.limiter.acquire().await;
        match tokio::time::timeout(self.policy.call_timeout, self.inner.call(method, params)).await
        {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout),
        }
    }
}

#[async_trait]
impl<C: ApiClient> ApiClient for RateLimitedClient<C> {
    async fn call(&self, method: &str, params: &Params) -> ApiResult<Value> {
        let mut rate_limit_retries = 0;
        let mut flood_retries = 0;
        let mut network_retries = 0;

        loop {
            let error = match self.attempt(method, params).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            let delay = match &error {
                ApiError::RateLimited { .. } if rate_limit_retries < THROTTLE_RETRIES => {
                    rate_limit_retries += 1;
                    self.policy.rate_limit_backoff
                }
                ApiError::FloodControl { .. } if flood_retries < THROTTLE_RETRIES => {
                    flood_retries += 1;
                    self.policy.flood_control_backoff
                }
                ApiError::Network(_) | ApiError::Timeout
                    if network_retries < self.policy.max_network_retries =>
                {
                    network_retries += 1;
                    self.policy.network_delay(network_retries)
                }
                _ => return Err(error),
            };

            tracing::warn!(
                method,
                error = %error,
                delay_ms = delay.as_millis() as u64,
                "Upstream call failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
