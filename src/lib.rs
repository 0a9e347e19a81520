//! Wallwatch: keyword monitoring for community walls
//!
//! This crate periodically crawls the walls of configured communities through a
//! rate-limited upstream API, scans every new comment for configured keywords
//! (including Russian word forms), records the matches, and tracks each crawl
//! as a durable task.

pub mod api;
pub mod config;
pub mod crawler;
pub mod matching;
pub mod output;
pub mod server;
pub mod storage;
pub mod tasks;

use thiserror::Error;

/// Main error type for Wallwatch operations
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("API error: {0}")]
    Api(#[from] api::ApiError),

    #[error("Crawl error: {0}")]
    Crawl(#[from] crawler::CrawlError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Task registry error: {0}")]
    Task(#[from] tasks::TaskError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Missing access token: set [api].access-token or WALLWATCH_ACCESS_TOKEN")]
    MissingToken,
}

/// Result type alias for Wallwatch operations
pub type Result<T> = std::result::Result<T, WatchError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use api::{ApiClient, ApiError, RateLimitedClient};
pub use config::Config;
pub use crawler::{BulkConfig, BulkResult, CrawlOrchestrator, CrawlWorker, RunStats};
pub use matching::{KeywordMatcher, Normalizer};
pub use tasks::{Task, TaskRegistry, TaskStatus};
