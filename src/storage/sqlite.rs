//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::api::{ExternalComment, ExternalPost};
use crate::matching::KeywordHit;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    CommentRecord, GroupRecord, KeywordMatchRecord, KeywordRecord, SavedComment, StorageCounts,
};
use crate::WatchError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::path::Path;

const GROUP_COLUMNS: &str = "id, name, max_posts_to_check, is_active, last_crawled_at, \
                             total_posts, total_comments";

const KEYWORD_COLUMNS: &str = "id, word, case_sensitive, whole_word, is_active, match_count";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(WatchError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, WatchError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, WatchError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn count(&self, table: &str) -> StorageResult<u64> {
        let count: i64 =
            self.conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?;
        Ok(count as u64)
    }

    fn query_groups(&self, filter: &str) -> StorageResult<Vec<GroupRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM groups {} ORDER BY id",
            GROUP_COLUMNS, filter
        ))?;
        let groups = stmt
            .query_map([], group_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(groups)
    }

    fn query_keywords(&self, tail: &str) -> StorageResult<Vec<KeywordRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM keywords {}", KEYWORD_COLUMNS, tail))?;
        let keywords = stmt
            .query_map([], keyword_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keywords)
    }
}

fn group_from_row(row: &Row<'_>) -> rusqlite::Result<GroupRecord> {
    Ok(GroupRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        max_posts_to_check: row.get(2)?,
        is_active: row.get(3)?,
        last_crawled_at: row.get(4)?,
        total_posts: row.get::<_, i64>(5)? as u64,
        total_comments: row.get::<_, i64>(6)? as u64,
    })
}

fn keyword_from_row(row: &Row<'_>) -> rusqlite::Result<KeywordRecord> {
    Ok(KeywordRecord {
        id: row.get(0)?,
        word: row.get(1)?,
        case_sensitive: row.get(2)?,
        whole_word: row.get(3)?,
        is_active: row.get(4)?,
        match_count: row.get::<_, i64>(5)? as u64,
    })
}

/// Inserts matches for a comment, returning how many were new per keyword
///
/// Each keyword's running `match_count` is raised by its new matches on the
/// same connection, so callers inside a transaction keep both in step.
fn insert_matches(
    conn: &Connection,
    comment_id: i64,
    hits: &[KeywordHit],
    now: &str,
) -> StorageResult<Vec<(i64, u64)>> {
    let mut stmt = conn.prepare_cached(
        "INSERT OR IGNORE INTO keyword_matches
         (comment_id, keyword_id, matched_text, match_position, context, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;

    let mut inserted = Vec::new();
    for hit in hits {
        let mut count = 0u64;
        for m in &hit.matches {
            count += stmt.execute(params![
                comment_id,
                hit.keyword_id,
                m.matched_text,
                m.position as i64,
                m.context,
                now
            ])? as u64;
        }
        if count > 0 {
            add_to_match_count(conn, hit.keyword_id, count)?;
            inserted.push((hit.keyword_id, count));
        }
    }

    Ok(inserted)
}

fn add_to_match_count(conn: &Connection, keyword_id: i64, by: u64) -> StorageResult<()> {
    conn.execute(
        "UPDATE keywords SET match_count = match_count + ?1 WHERE id = ?2",
        params![by as i64, keyword_id],
    )?;
    Ok(())
}

/// Stores how many distinct keywords matched a comment
fn refresh_match_count(conn: &Connection, comment_id: i64) -> StorageResult<()> {
    conn.execute(
        "UPDATE comments SET matched_keyword_count =
         (SELECT COUNT(DISTINCT keyword_id) FROM keyword_matches WHERE comment_id = ?1)
         WHERE id = ?1",
        params![comment_id],
    )?;
    Ok(())
}

impl Storage for SqliteStorage {
    // ===== Groups =====

    fn upsert_group(
        &mut self,
        id: i64,
        name: Option<&str>,
        max_posts_to_check: u32,
        is_active: bool,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO groups (id, name, max_posts_to_check, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                name = COALESCE(excluded.name, groups.name),
                max_posts_to_check = excluded.max_posts_to_check,
                is_active = excluded.is_active",
            params![id, name, max_posts_to_check, is_active, now],
        )?;
        Ok(())
    }

    fn get_group(&self, id: i64) -> StorageResult<Option<GroupRecord>> {
        let group = self
            .conn
            .query_row(
                &format!("SELECT {} FROM groups WHERE id = ?1", GROUP_COLUMNS),
                params![id],
                group_from_row,
            )
            .optional()?;
        Ok(group)
    }

    fn list_groups(&self) -> StorageResult<Vec<GroupRecord>> {
        self.query_groups("")
    }

    fn list_active_groups(&self) -> StorageResult<Vec<GroupRecord>> {
        self.query_groups("WHERE is_active = 1")
    }

    fn update_group_name(&mut self, id: i64, name: &str) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE groups SET name = ?1 WHERE id = ?2",
            params![name, id],
        )?;
        if changed == 0 {
            return Err(StorageError::GroupNotFound(id));
        }
        Ok(())
    }

    fn record_group_crawl(
        &mut self,
        id: i64,
        posts: u64,
        new_comments: u64,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE groups SET last_crawled_at = ?1,
                total_posts = total_posts + ?2,
                total_comments = total_comments + ?3
             WHERE id = ?4",
            params![now, posts as i64, new_comments as i64, id],
        )?;
        if changed == 0 {
            return Err(StorageError::GroupNotFound(id));
        }
        Ok(())
    }

    // ===== Posts =====

    fn save_post(&mut self, group_id: i64, post: &ExternalPost) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        let counter = |c: &Option<crate::api::Counter>| c.as_ref().map(|c| c.count).unwrap_or(0);

        self.conn.execute(
            "INSERT INTO posts
             (external_id, group_id, text, published_at, likes, reposts, views, comments_count,
              created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
             ON CONFLICT(external_id, group_id) DO UPDATE SET
                text = excluded.text,
                likes = excluded.likes,
                reposts = excluded.reposts,
                views = excluded.views,
                comments_count = excluded.comments_count,
                updated_at = excluded.updated_at",
            params![
                post.id,
                group_id,
                post.text,
                post.published_at().to_rfc3339(),
                counter(&post.likes),
                counter(&post.reposts),
                counter(&post.views),
                post.comment_count(),
                now
            ],
        )?;

        let id = self.conn.query_row(
            "SELECT id FROM posts WHERE external_id = ?1 AND group_id = ?2",
            params![post.id, group_id],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn mark_post_processed(&mut self, post_id: i64) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE posts SET is_processed = 1 WHERE id = ?1",
            params![post_id],
        )?;
        if changed == 0 {
            return Err(StorageError::PostNotFound(post_id));
        }
        Ok(())
    }

    // ===== Comments =====

    fn existing_comment_ids(&self, post_id: i64) -> StorageResult<HashSet<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT external_id FROM comments WHERE post_id = ?1")?;
        let ids = stmt
            .query_map(params![post_id], |row| row.get(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(ids)
    }

    fn comments_for_post(&self, post_id: i64) -> StorageResult<Vec<CommentRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, external_id, post_id, author_id, text, published_at, is_processed,
             processed_at, matched_keyword_count
             FROM comments WHERE post_id = ?1 ORDER BY external_id",
        )?;

        let comments = stmt
            .query_map(params![post_id], |row| {
                Ok(CommentRecord {
                    id: row.get(0)?,
                    external_id: row.get(1)?,
                    post_id: row.get(2)?,
                    author_id: row.get(3)?,
                    text: row.get(4)?,
                    published_at: row.get(5)?,
                    is_processed: row.get(6)?,
                    processed_at: row.get(7)?,
                    matched_keyword_count: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(comments)
    }

    fn save_comment(
        &mut self,
        post_id: i64,
        comment: &ExternalComment,
        hits: &[KeywordHit],
    ) -> StorageResult<SavedComment> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;

        let created = tx.execute(
            "INSERT OR IGNORE INTO comments
             (external_id, post_id, author_id, text, published_at, is_processed, processed_at,
              created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)",
            params![
                comment.id,
                post_id,
                comment.from_id,
                comment.text,
                comment.published_at().to_rfc3339(),
                now
            ],
        )? > 0;

        let id: i64 = tx.query_row(
            "SELECT id FROM comments WHERE post_id = ?1 AND external_id = ?2",
            params![post_id, comment.id],
            |row| row.get(0),
        )?;

        let new_matches = if created {
            let inserted = insert_matches(&tx, id, hits, &now)?;
            refresh_match_count(&tx, id)?;
            inserted
        } else {
            Vec::new()
        };

        tx.commit()?;

        Ok(SavedComment {
            id,
            created,
            new_matches,
        })
    }

    fn add_matches(
        &mut self,
        comment_id: i64,
        hits: &[KeywordHit],
    ) -> StorageResult<Vec<(i64, u64)>> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        let inserted = insert_matches(&tx, comment_id, hits, &now)?;
        if !inserted.is_empty() {
            refresh_match_count(&tx, comment_id)?;
        }
        tx.commit()?;
        Ok(inserted)
    }

    fn get_comment_matches(&self, comment_id: i64) -> StorageResult<Vec<KeywordMatchRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, comment_id, keyword_id, matched_text, match_position, context
             FROM keyword_matches WHERE comment_id = ?1 ORDER BY match_position, keyword_id",
        )?;

        let matches = stmt
            .query_map(params![comment_id], |row| {
                Ok(KeywordMatchRecord {
                    id: row.get(0)?,
                    comment_id: row.get(1)?,
                    keyword_id: row.get(2)?,
                    matched_text: row.get(3)?,
                    match_position: row.get::<_, i64>(4)? as usize,
                    context: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(matches)
    }

    // ===== Keywords =====

    fn upsert_keyword(
        &mut self,
        word: &str,
        case_sensitive: bool,
        whole_word: bool,
        is_active: bool,
    ) -> StorageResult<i64> {
        let word = word.trim();
        if word.is_empty() {
            return Err(StorageError::ConstraintViolation(
                "keyword must not be empty".to_string(),
            ));
        }

        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO keywords (word, case_sensitive, whole_word, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(word) DO UPDATE SET
                case_sensitive = excluded.case_sensitive,
                whole_word = excluded.whole_word,
                is_active = excluded.is_active",
            params![word, case_sensitive, whole_word, is_active, now],
        )?;

        let id = self.conn.query_row(
            "SELECT id FROM keywords WHERE word = ?1",
            params![word],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn get_active_keywords(&self) -> StorageResult<Vec<KeywordRecord>> {
        self.query_keywords("WHERE is_active = 1 ORDER BY id")
    }

    fn list_keywords(&self) -> StorageResult<Vec<KeywordRecord>> {
        self.query_keywords("ORDER BY match_count DESC, id")
    }

    fn increment_keyword_match_count(&mut self, keyword_id: i64, by: u64) -> StorageResult<()> {
        add_to_match_count(&self.conn, keyword_id, by)
    }

    // ===== Statistics =====

    fn counts(&self) -> StorageResult<StorageCounts> {
        Ok(StorageCounts {
            groups: self.count("groups")?,
            posts: self.count("posts")?,
            comments: self.count("comments")?,
            keywords: self.count("keywords")?,
            keyword_matches: self.count("keyword_matches")?,
        })
    }
}
