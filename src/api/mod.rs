//! Upstream API access
//!
//! This module contains everything needed to talk to the social network's
//! `method/<name>` REST API:
//! - The [`ApiClient`] seam shared by the HTTP client, the throttling wrapper and test doubles
//! - A rolling-window [`RateLimiter`] shared by all concurrent callers
//! - [`RateLimitedClient`], which adds throttling, per-call timeouts and bounded retries
//! - Typed wrappers for the wall, comment and group methods the crawler uses

mod client;
mod error;
mod http;
mod limiter;
mod methods;
mod types;

pub use client::{RateLimitedClient, RetryPolicy};
pub use error::{ApiError, ApiResult};
pub use http::{build_http_client, HttpApiClient, USER_AGENT};
pub use limiter::RateLimiter;
pub use methods::{get_comments_page, get_group, get_wall_page};
pub use types::{Counter, Envelope, ExternalComment, ExternalPost, GroupInfo, Page};

use async_trait::async_trait;
use serde_json::Value;

/// Ordered request parameters for an API method
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter, returning the updated set
    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.0.push((key.to_string(), value.to_string()));
        self
    }

    /// Looks up a parameter by name
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// A client able to invoke upstream API methods
///
/// Implementations return the decoded `response` value on success and a
/// classified [`ApiError`] otherwise. The HTTP client, the rate-limited
/// wrapper and test doubles are interchangeable behind this trait.
#[async_trait]
pub trait ApiClient: Send + Sync {
    async fn call(&self, method: &str, params: &Params) -> ApiResult<Value>;
}

#[async_trait]
impl<T: ApiClient + ?Sized> ApiClient for std::sync::Arc<T> {
    async fn call(&self, method: &str, params: &Params) -> ApiResult<Value> {
        (**self).call(method, params).await
    }
}
