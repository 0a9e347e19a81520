//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the content database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Monitored communities, keyed by external id
CREATE TABLE IF NOT EXISTS groups (
    id INTEGER PRIMARY KEY,
    name TEXT,
    max_posts_to_check INTEGER NOT NULL DEFAULT 100,
    is_active INTEGER NOT NULL DEFAULT 1,
    last_crawled_at TEXT,
    total_posts INTEGER NOT NULL DEFAULT 0,
    total_comments INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

-- Wall posts
CREATE TABLE IF NOT EXISTS posts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    external_id INTEGER NOT NULL,
    group_id INTEGER NOT NULL REFERENCES groups(id),
    text TEXT NOT NULL DEFAULT '',
    published_at TEXT,
    likes INTEGER NOT NULL DEFAULT 0,
    reposts INTEGER NOT NULL DEFAULT 0,
    views INTEGER NOT NULL DEFAULT 0,
    comments_count INTEGER NOT NULL DEFAULT 0,
    is_processed INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(external_id, group_id)
);

CREATE INDEX IF NOT EXISTS idx_posts_group ON posts(group_id);

-- Comments; external ids are unique per wall
CREATE TABLE IF NOT EXISTS comments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    external_id INTEGER NOT NULL,
    post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
    author_id INTEGER NOT NULL DEFAULT 0,
    text TEXT NOT NULL DEFAULT '',
    published_at TEXT,
    is_processed INTEGER NOT NULL DEFAULT 0,
    processed_at TEXT,
    matched_keyword_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    UNIQUE(post_id, external_id)
);

CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id);

-- Search terms
CREATE TABLE IF NOT EXISTS keywords (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    word TEXT NOT NULL UNIQUE,
    case_sensitive INTEGER NOT NULL DEFAULT 0,
    whole_word INTEGER NOT NULL DEFAULT 1,
    is_active INTEGER NOT NULL DEFAULT 1,
    match_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

-- One row per keyword occurrence in a comment
CREATE TABLE IF NOT EXISTS keyword_matches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    comment_id INTEGER NOT NULL REFERENCES comments(id) ON DELETE CASCADE,
    keyword_id INTEGER NOT NULL REFERENCES keywords(id) ON DELETE CASCADE,
    matched_text TEXT NOT NULL,
    match_position INTEGER NOT NULL,
    context TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(comment_id, keyword_id, match_position)
);

CREATE INDEX IF NOT EXISTS idx_keyword_matches_comment ON keyword_matches(comment_id);
CREATE INDEX IF NOT EXISTS idx_keyword_matches_keyword ON keyword_matches(keyword_id);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
