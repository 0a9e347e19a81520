use serde::Deserialize;

/// Main configuration structure for Wallwatch
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default, rename = "group")]
    pub groups: Vec<GroupEntry>,
    #[serde(default, rename = "keyword")]
    pub keywords: Vec<KeywordEntry>,
}

/// Upstream API access and rate-limit configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ApiConfig {
    /// Base URL of the method endpoint, without a trailing slash
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer access token. Falls back to `WALLWATCH_ACCESS_TOKEN` when empty.
    #[serde(default)]
    pub access_token: String,

    /// Fixed API version sent with every call
    #[serde(default = "default_api_version")]
    pub version: String,

    /// Requests allowed per rolling one-second window
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Upper bound for a single upstream call (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries for network failures and timeouts
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Pause before retrying a "too many requests" response (milliseconds)
    #[serde(default = "default_rate_limit_backoff_ms")]
    pub rate_limit_backoff_ms: u64,

    /// Pause before retrying a flood-control response (milliseconds)
    #[serde(default = "default_flood_control_backoff_ms")]
    pub flood_control_backoff_ms: u64,

    /// Base pause before retrying a network failure, doubled per attempt (milliseconds)
    #[serde(default = "default_network_backoff_ms")]
    pub network_backoff_ms: u64,
}

/// Crawl behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Items requested per page from the wall and comment endpoints
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Maximum number of groups crawled at once by a bulk request
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: u32,

    /// Posts checked per group when the group sets no limit of its own
    #[serde(default = "default_max_posts")]
    pub default_max_posts: u32,

    /// Expand keywords into their word forms before matching
    #[serde(default = "default_true")]
    pub morphology: bool,
}

/// Persistence configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StorageConfig {
    /// Path to the SQLite database holding groups, posts, comments and keywords
    pub database_path: String,

    /// Backing used by the task registry
    #[serde(default)]
    pub task_store: TaskStoreKind,

    /// Database file for the task registry (defaults to `database_path`)
    #[serde(default)]
    pub task_database_path: Option<String>,
}

/// Available task registry backings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStoreKind {
    /// Shared SQLite file, visible to every process using it
    #[default]
    Sqlite,
    /// Process-local memory; only valid for single-process deployments
    Memory,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

/// A monitored community
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GroupEntry {
    /// Community id on the upstream service (positive)
    pub id: i64,

    /// Display name
    #[serde(default)]
    pub name: Option<String>,

    /// Posts checked per crawl
    #[serde(default)]
    pub max_posts: Option<u32>,

    #[serde(default = "default_true")]
    pub active: bool,
}

/// A keyword to look for in comments
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct KeywordEntry {
    pub word: String,

    #[serde(default)]
    pub case_sensitive: bool,

    #[serde(default = "default_true")]
    pub whole_word: bool,

    #[serde(default = "default_true")]
    pub active: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_concurrent: default_max_concurrent(),
            default_max_posts: default_max_posts(),
            morphology: true,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl StorageConfig {
    /// Path of the database backing the task registry
    pub fn task_database_path(&self) -> &str {
        self.task_database_path
            .as_deref()
            .unwrap_or(&self.database_path)
    }
}

fn default_base_url() -> String {
    "https://api.vk.com/method".to_string()
}

fn default_api_version() -> String {
    "5.131".to_string()
}

fn default_requests_per_second() -> u32 {
    3
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_rate_limit_backoff_ms() -> u64 {
    1000
}

fn default_flood_control_backoff_ms() -> u64 {
    5000
}

fn default_network_backoff_ms() -> u64 {
    1000
}

fn default_page_size() -> u32 {
    100
}

fn default_max_concurrent() -> u32 {
    3
}

fn default_max_posts() -> u32 {
    100
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_true() -> bool {
    true
}
