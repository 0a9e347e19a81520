//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::api::{ExternalComment, ExternalPost};
use crate::matching::KeywordHit;
use crate::storage::{
    CommentRecord, GroupRecord, KeywordMatchRecord, KeywordRecord, SavedComment, StorageCounts,
};
use std::collections::HashSet;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Group not found: {0}")]
    GroupNotFound(i64),

    #[error("Post not found: {0}")]
    PostNotFound(i64),

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// This trait defines all database operations needed by the crawl pipeline.
pub trait Storage {
    // ===== Groups =====

    /// Inserts a group or updates its monitoring configuration
    ///
    /// Crawl bookkeeping (last crawl time, totals) is left untouched on update.
    fn upsert_group(
        &mut self,
        id: i64,
        name: Option<&str>,
        max_posts_to_check: u32,
        is_active: bool,
    ) -> StorageResult<()>;

    /// Gets a group by its external id
    fn get_group(&self, id: i64) -> StorageResult<Option<GroupRecord>>;

    /// Gets all groups, ordered by id
    fn list_groups(&self) -> StorageResult<Vec<GroupRecord>>;

    /// Gets active groups, ordered by id
    fn list_active_groups(&self) -> StorageResult<Vec<GroupRecord>>;

    /// Stores the community name reported upstream
    fn update_group_name(&mut self, id: i64, name: &str) -> StorageResult<()>;

    /// Records a finished crawl: sets the crawl time and adds to the totals
    fn record_group_crawl(&mut self, id: i64, posts: u64, new_comments: u64)
        -> StorageResult<()>;

    // ===== Posts =====

    /// Inserts a post or refreshes its text and counters
    ///
    /// # Arguments
    ///
    /// * `group_id` - External id of the owning group
    /// * `post` - The post as returned upstream
    ///
    /// # Returns
    ///
    /// The database id of the post
    fn save_post(&mut self, group_id: i64, post: &ExternalPost) -> StorageResult<i64>;

    /// Marks a post's comments as fully processed
    fn mark_post_processed(&mut self, post_id: i64) -> StorageResult<()>;

    // ===== Comments =====

    /// External ids of comments already stored for a post
    fn existing_comment_ids(&self, post_id: i64) -> StorageResult<HashSet<i64>>;

    /// Stored comments of a post, in external id order
    fn comments_for_post(&self, post_id: i64) -> StorageResult<Vec<CommentRecord>>;

    /// Saves a comment and its keyword matches in one transaction
    ///
    /// The matched keywords' counters are raised in the same transaction.
    /// Saving an already stored comment creates nothing; matches are unique
    /// per (comment, keyword, position).
    fn save_comment(
        &mut self,
        post_id: i64,
        comment: &ExternalComment,
        hits: &[KeywordHit],
    ) -> StorageResult<SavedComment>;

    /// Adds matches to a stored comment, skipping ones already recorded
    ///
    /// Keyword counters grow by the inserted matches only, in one transaction.
    ///
    /// # Returns
    ///
    /// Newly inserted matches per keyword id
    fn add_matches(&mut self, comment_id: i64, hits: &[KeywordHit])
        -> StorageResult<Vec<(i64, u64)>>;

    /// Gets the matches recorded for a comment, ordered by position
    fn get_comment_matches(&self, comment_id: i64) -> StorageResult<Vec<KeywordMatchRecord>>;

    // ===== Keywords =====

    /// Inserts a keyword or updates its flags, returning its id
    fn upsert_keyword(
        &mut self,
        word: &str,
        case_sensitive: bool,
        whole_word: bool,
        is_active: bool,
    ) -> StorageResult<i64>;

    /// Gets active keywords, ordered by id
    fn get_active_keywords(&self) -> StorageResult<Vec<KeywordRecord>>;

    /// Gets all keywords, most matched first
    fn list_keywords(&self) -> StorageResult<Vec<KeywordRecord>>;

    /// Adds `by` to a keyword's running match counter
    fn increment_keyword_match_count(&mut self, keyword_id: i64, by: u64) -> StorageResult<()>;

    // ===== Statistics =====

    /// Row counts across the content tables
    fn counts(&self) -> StorageResult<StorageCounts>;
}
