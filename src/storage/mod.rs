//! Storage module for persisting monitored content
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Group configuration and crawl bookkeeping
//! - Post and comment persistence with "already seen" checks
//! - Keywords, their running match counters and recorded matches

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::config::Config;
use crate::matching::KeywordRule;
use crate::WatchError;

use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Storage handle shared between crawl workers and the HTTP surface
pub type SharedStorage = Arc<Mutex<SqliteStorage>>;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(WatchError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, WatchError> {
    SqliteStorage::new(path)
}

/// Opens a storage database wrapped for sharing
pub fn open_shared(path: &Path) -> Result<SharedStorage, WatchError> {
    Ok(Arc::new(Mutex::new(SqliteStorage::new(path)?)))
}

/// Locks shared storage, mapping a poisoned lock to [`StorageError::LockPoisoned`]
pub fn lock(storage: &SharedStorage) -> StorageResult<MutexGuard<'_, SqliteStorage>> {
    storage.lock().map_err(|_| StorageError::LockPoisoned)
}

/// Writes the configured groups and keywords into storage
///
/// Existing rows are updated in place, so crawl bookkeeping and keyword
/// counters survive. Groups without their own limit get
/// `[crawler] default-max-posts`.
///
/// # Returns
///
/// The number of groups and keywords synchronised
pub fn sync_config(storage: &mut dyn Storage, config: &Config) -> StorageResult<(usize, usize)> {
    for group in &config.groups {
        storage.upsert_group(
            group.id,
            group.name.as_deref(),
            group.max_posts.unwrap_or(config.crawler.default_max_posts),
            group.active,
        )?;
    }
    for keyword in &config.keywords {
        storage.upsert_keyword(
            &keyword.word,
            keyword.case_sensitive,
            keyword.whole_word,
            keyword.active,
        )?;
    }

    tracing::info!(
        groups = config.groups.len(),
        keywords = config.keywords.len(),
        "Synchronised configuration into storage"
    );
    Ok((config.groups.len(), config.keywords.len()))
}

/// Represents a monitored community
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupRecord {
    /// External community id
    pub id: i64,
    pub name: Option<String>,
    pub max_posts_to_check: u32,
    pub is_active: bool,
    pub last_crawled_at: Option<String>,
    pub total_posts: u64,
    pub total_comments: u64,
}

/// Represents a wall post in the database
#[derive(Debug, Clone, Serialize)]
pub struct PostRecord {
    pub id: i64,
    pub external_id: i64,
    pub group_id: i64,
    pub text: String,
    pub published_at: Option<String>,
    pub likes: i64,
    pub reposts: i64,
    pub views: i64,
    pub comments_count: i64,
    pub is_processed: bool,
}

/// Represents a stored comment
#[derive(Debug, Clone, Serialize)]
pub struct CommentRecord {
    pub id: i64,
    pub external_id: i64,
    pub post_id: i64,
    pub author_id: i64,
    pub text: String,
    pub published_at: Option<String>,
    pub is_processed: bool,
    pub processed_at: Option<String>,
    pub matched_keyword_count: u32,
}

/// Represents a keyword and its running match counter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeywordRecord {
    pub id: i64,
    pub word: String,
    pub case_sensitive: bool,
    pub whole_word: bool,
    pub is_active: bool,
    pub match_count: u64,
}

impl KeywordRecord {
    /// The keyword as the matcher sees it
    pub fn rule(&self) -> KeywordRule {
        KeywordRule {
            id: self.id,
            word: self.word.clone(),
            case_sensitive: self.case_sensitive,
            whole_word: self.whole_word,
            active: self.is_active,
        }
    }
}

/// One recorded occurrence of a keyword in a comment
#[derive(Debug, Clone, Serialize)]
pub struct KeywordMatchRecord {
    pub id: i64,
    pub comment_id: i64,
    pub keyword_id: i64,
    pub matched_text: String,
    pub match_position: usize,
    pub context: String,
}

/// Outcome of saving a comment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedComment {
    pub id: i64,
    /// False when the comment was already stored
    pub created: bool,
    /// Newly inserted matches per keyword id
    pub new_matches: Vec<(i64, u64)>,
}

impl SavedComment {
    pub fn inserted_matches(&self) -> u64 {
        self.new_matches.iter().map(|(_, n)| n).sum()
    }
}

/// Row counts across the content tables
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StorageCounts {
    pub groups: u64,
    pub posts: u64,
    pub comments: u64,
    pub keywords: u64,
    pub keyword_matches: u64,
}
