use crate::config::types::{ApiConfig, Config, CrawlerConfig, GroupEntry, KeywordEntry, StorageConfig};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_api_config(&config.api)?;
    validate_crawler_config(&config.crawler)?;
    validate_storage_config(&config.storage)?;
    validate_groups(&config.groups)?;
    validate_keywords(&config.keywords)?;
    Ok(())
}

/// Validates upstream API configuration
fn validate_api_config(config: &ApiConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url '{}' must use http or https",
            config.base_url
        )));
    }

    if config.version.trim().is_empty() {
        return Err(ConfigError::Validation(
            "api version cannot be empty".to_string(),
        ));
    }

    if config.requests_per_second < 1 {
        return Err(ConfigError::Validation(format!(
            "requests-per-second must be >= 1, got {}",
            config.requests_per_second
        )));
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.page_size < 1 || config.page_size > 100 {
        return Err(ConfigError::Validation(format!(
            "page-size must be between 1 and 100, got {}",
            config.page_size
        )));
    }

    if config.max_concurrent < 1 {
        return Err(ConfigError::Validation(format!(
            "max-concurrent must be >= 1, got {}",
            config.max_concurrent
        )));
    }

    if config.default_max_posts < 1 {
        return Err(ConfigError::Validation(
            "default-max-posts must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates storage configuration
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    if let Some(path) = &config.task_database_path {
        if path.trim().is_empty() {
            return Err(ConfigError::Validation(
                "task-database-path cannot be empty when set".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates monitored group entries
fn validate_groups(groups: &[GroupEntry]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for group in groups {
        if group.id <= 0 {
            return Err(ConfigError::Validation(format!(
                "group id must be positive, got {}",
                group.id
            )));
        }

        if !seen.insert(group.id) {
            return Err(ConfigError::Validation(format!(
                "group {} is configured more than once",
                group.id
            )));
        }

        if group.max_posts == Some(0) {
            return Err(ConfigError::Validation(format!(
                "group {}: max-posts must be >= 1",
                group.id
            )));
        }
    }

    Ok(())
}

/// Validates keyword entries
fn validate_keywords(keywords: &[KeywordEntry]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for keyword in keywords {
        let word = keyword.word.trim();
        if word.is_empty() {
            return Err(ConfigError::Validation(
                "keyword cannot be empty".to_string(),
            ));
        }

        if !seen.insert(word.to_lowercase()) {
            return Err(ConfigError::Validation(format!(
                "keyword '{}' is configured more than once",
                word
            )));
        }
    }

    Ok(())
}
