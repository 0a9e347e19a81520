//! Configuration module for Wallwatch
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use wallwatch::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("wallwatch.toml")).unwrap();
//! println!("Requests per second: {}", config.api.requests_per_second);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ApiConfig, Config, CrawlerConfig, GroupEntry, KeywordEntry, ServerConfig, StorageConfig,
    TaskStoreKind,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
