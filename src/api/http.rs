//! HTTP transport for the upstream API
//!
//! This module handles the raw requests to the method endpoint:
//! - Building the HTTP client with a proper user agent and timeouts
//! - Sending the bearer token and fixed API version with every call
//! - Decoding the `{"response"}` / `{"error"}` envelope into typed results
//!
//! Throttling and retries live in [`crate::api::RateLimitedClient`]; this
//! client performs exactly one request per call.

use crate::api::error::{ApiError, ApiResult};
use crate::api::types::Envelope;
use crate::api::{ApiClient, Params};
use crate::config::ApiConfig;
use crate::ConfigError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;

/// User agent sent with every upstream request
pub const USER_AGENT: &str = concat!("wallwatch/", env!("CARGO_PKG_VERSION"));

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The API configuration (only the timeout is used)
pub fn build_http_client(config: &ApiConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Upstream API client speaking the `method/<name>` REST protocol
pub struct HttpApiClient {
    client: Client,
    base_url: String,
    access_token: String,
    version: String,
}

impl HttpApiClient {
    /// Creates a client from configuration
    ///
    /// # Returns
    ///
    /// * `Ok(HttpApiClient)` - Ready to issue calls
    /// * `Err(ConfigError::MissingToken)` - No access token configured
    pub fn new(config: &ApiConfig) -> Result<Self, ConfigError> {
        if config.access_token.trim().is_empty() {
            return Err(ConfigError::MissingToken);
        }

        let client = build_http_client(config)
            .map_err(|e| ConfigError::Validation(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            version: config.version.clone(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }
}

#[async_trait]
impl ApiClient for HttpApiClient {
    async fn call(&self, method: &str, params: &Params) -> ApiResult<Value> {
        let mut form: Vec<(&str, &str)> = params.iter().collect();
        form.push(("v", self.version.as_str()));

        tracing::trace!(method, "Calling upstream API");

        let response = self
            .client
            .post(self.method_url(method))
            .bearer_auth(&self.access_token)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ApiError::RateLimited {
                message: format!("HTTP {}", status.as_u16()),
            });
        }
        if status.is_server_error() {
            return Err(ApiError::Network(format!("HTTP {}", status.as_u16())));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Upstream {
                code: i64::from(status.as_u16()),
                message: body,
            });
        }

        let body = response.text().await?;
        let envelope: Envelope = serde_json::from_str(&body)?;
        envelope.into_result()
    }
}
