use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Environment variable consulted when the config carries no access token
pub const ACCESS_TOKEN_ENV: &str = "WALLWATCH_ACCESS_TOKEN";

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration from TOML text
///
/// An empty `access-token` is filled from `WALLWATCH_ACCESS_TOKEN` when that
/// variable is set.
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let mut config: Config = toml::from_str(content)?;

    if config.api.access_token.trim().is_empty() {
        if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV) {
            config.api.access_token = token;
        }
    }

    validate(&config)?;

    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Recorded on every task so runs under different configurations can be told apart.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(hash_content(&content))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    Ok((config, hash_content(&content)))
}

fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TaskStoreKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const VALID: &str = r#"
[api]
access-token = "secret"
requests-per-second = 3

[crawler]
page-size = 50
max-concurrent = 2

[storage]
database-path = "./wallwatch.db"
task-store = "memory"

[[group]]
id = 12345
name = "City news"
max-posts = 20

[[keyword]]
word = "жалоба"

[[keyword]]
word = "Spam"
case-sensitive = true
whole-word = false
"#;

    #[test]
    fn test_load_valid_config() {
        let file = create_temp_config(VALID);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.api.base_url, "https://api.vk.com/method");
        assert_eq!(config.api.version, "5.131");
        assert_eq!(config.api.requests_per_second, 3);
        assert_eq!(config.crawler.page_size, 50);
        assert_eq!(config.crawler.max_concurrent, 2);
        assert!(config.crawler.morphology);
        assert_eq!(config.storage.task_store, TaskStoreKind::Memory);
        assert_eq!(config.storage.task_database_path(), "./wallwatch.db");
        assert_eq!(config.groups.len(), 1);
        assert_eq!(config.groups[0].max_posts, Some(20));
        assert!(config.groups[0].active);
        assert_eq!(config.keywords.len(), 2);
        assert!(config.keywords[0].whole_word);
        assert!(!config.keywords[0].case_sensitive);
        assert!(config.keywords[1].case_sensitive);
        assert!(!config.keywords[1].whole_word);
    }

    #[test]
    fn test_defaults_for_missing_sections() {
        let config = parse_config(
            r#"
[api]
access-token = "t"

[storage]
database-path = "db.sqlite"
"#,
        )
        .unwrap();

        assert_eq!(config.crawler.page_size, 100);
        assert_eq!(config.crawler.max_concurrent, 3);
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.api.flood_control_backoff_ms, 5000);
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(config.storage.task_store, TaskStoreKind::Sqlite);
        assert!(config.groups.is_empty());
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/wallwatch.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let file = create_temp_config(
            r#"
[api]
access-token = "t"
requests-per-second = 0

[storage]
database-path = "db.sqlite"
"#,
        );
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_load_config_with_hash_matches_file_hash() {
        let file = create_temp_config(VALID);
        let (_, hash) = load_config_with_hash(file.path()).unwrap();
        assert_eq!(hash, compute_config_hash(file.path()).unwrap());
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }
}
