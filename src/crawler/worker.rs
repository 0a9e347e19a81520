//! Per-group crawl: posts, then comments, then keyword matching
//!
//! A run walks the group's wall newest first in pages of `page-size` until
//! `max_posts` posts were seen or the wall ends. For every post with comments
//! it pages through the comments oldest first until a short page. Comments
//! already stored for the post are skipped, so repeated runs never duplicate
//! rows. Every new comment is stored; matches are stored with it.
//!
//! # Error policy
//!
//! | Failure | Effect |
//! |---------|--------|
//! | Group missing, inactive or unavailable upstream | Run fails |
//! | Wall page cannot be fetched | Run fails |
//! | Comments denied / not found / malformed | Post skipped, run continues |
//! | Transient error left after retries | Run fails |
//! | Storage error | Run fails |

use crate::api::{self, ApiClient, ExternalPost};
use crate::crawler::{CrawlError, CrawlOptions, CrawlResult, StopSignal};
use crate::matching::{KeywordMatcher, KeywordSet};
use crate::storage::{self, GroupRecord, SharedStorage, SqliteStorage, Storage, StorageResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Counters for one crawl run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub posts_processed: u64,
    /// Posts whose comments could not be read (denied, missing or malformed)
    #[serde(default)]
    pub posts_skipped: u64,
    /// Comments returned upstream, seen before or not
    pub comments_found: u64,
    /// New comments with at least one keyword match
    pub comments_with_keywords: u64,
    pub new_comments: u64,
    /// Keyword matches recorded during the run
    pub keyword_matches: u64,
}

impl RunStats {
    /// Adds another run's counters to these
    pub fn merge(&mut self, other: &RunStats) {
        self.posts_processed += other.posts_processed;
        self.posts_skipped += other.posts_skipped;
        self.comments_found += other.comments_found;
        self.comments_with_keywords += other.comments_with_keywords;
        self.new_comments += other.new_comments;
        self.keyword_matches += other.keyword_matches;
    }
}

/// Crawls one group at a time
pub struct CrawlWorker {
    client: Arc<dyn ApiClient>,
    storage: SharedStorage,
    matcher: KeywordMatcher,
    page_size: u32,
}

impl CrawlWorker {
    /// Creates a worker
    ///
    /// # Arguments
    ///
    /// * `client` - Upstream client, normally a [`crate::api::RateLimitedClient`]
    /// * `storage` - Shared content storage
    /// * `matcher` - Keyword matcher used on every new comment
    /// * `page_size` - Items requested per upstream page (1..=100)
    pub fn new(
        client: Arc<dyn ApiClient>,
        storage: SharedStorage,
        matcher: KeywordMatcher,
        page_size: u32,
    ) -> Self {
        Self {
            client,
            storage,
            matcher,
            page_size: page_size.clamp(1, 100),
        }
    }

    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }

    /// Runs with the lock held; never call across an await
    fn with_storage<T>(
        &self,
        f: impl FnOnce(&mut SqliteStorage) -> StorageResult<T>,
    ) -> CrawlResult<T> {
        let mut guard = storage::lock(&self.storage)?;
        Ok(f(&mut *guard)?)
    }

    /// Crawls one group
    ///
    /// Stopping is checked between pages and between posts; a stopped run
    /// returns the counters gathered so far.
    pub async fn run(
        &self,
        group_id: i64,
        options: &CrawlOptions,
        stop: &StopSignal,
    ) -> CrawlResult<RunStats> {
        let group = self.load_group(group_id)?;
        self.check_upstream(&group).await?;

        let keywords = self.keyword_snapshot(options)?;
        let max_posts = options.max_posts.unwrap_or(group.max_posts_to_check);
        let mut stats = RunStats::default();

        tracing::info!(
            group_id,
            max_posts,
            keywords = keywords.len(),
            force_reparse = options.force_reparse,
            "Starting group crawl"
        );

        let mut offset = 0u32;
        'pages: while (stats.posts_processed as u32) < max_posts {
            if stop.is_stopped() {
                tracing::info!(group_id, "Stop requested, ending group crawl");
                break;
            }

            let remaining = max_posts - stats.posts_processed as u32;
            let count = self.page_size.min(remaining);
            let page = api::get_wall_page(self.client.as_ref(), group_id, offset, count).await?;
            tracing::debug!(group_id, offset, returned = page.items.len(), "Fetched wall page");

            let returned = page.items.len() as u32;
            for post in &page.items {
                if (stats.posts_processed as u32) >= max_posts {
                    break 'pages;
                }
                if stop.is_stopped() {
                    tracing::info!(group_id, "Stop requested, ending group crawl");
                    break 'pages;
                }
                self.process_post(group_id, post, &keywords, options, stop, &mut stats)
                    .await?;
                stats.posts_processed += 1;
            }

            offset += returned;
            if returned < count || i64::from(offset) >= page.count {
                break;
            }
        }

        self.with_storage(|s| {
            s.record_group_crawl(group_id, stats.posts_processed, stats.new_comments)
        })?;

        tracing::info!(
            group_id,
            posts = stats.posts_processed,
            comments = stats.comments_found,
            new_comments = stats.new_comments,
            matches = stats.keyword_matches,
            "Group crawl finished"
        );
        Ok(stats)
    }

    fn load_group(&self, group_id: i64) -> CrawlResult<GroupRecord> {
        let group = self
            .with_storage(|s| s.get_group(group_id))?
            .ok_or(CrawlError::GroupNotFound(group_id))?;
        if !group.is_active {
            return Err(CrawlError::GroupInactive(group_id));
        }
        Ok(group)
    }

    /// Confirms the group exists upstream and refreshes its stored name
    async fn check_upstream(&self, group: &GroupRecord) -> CrawlResult<()> {
        let info = match api::get_group(self.client.as_ref(), group.id).await {
            Ok(info) => info,
            Err(e) if e.is_skippable() => {
                return Err(CrawlError::GroupUnavailable {
                    group_id: group.id,
                    reason: e.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(reason) = info.deactivated {
            return Err(CrawlError::GroupUnavailable {
                group_id: group.id,
                reason: format!("deactivated: {}", reason),
            });
        }

        if !info.name.is_empty() && group.name.as_deref() != Some(info.name.as_str()) {
            self.with_storage(|s| s.update_group_name(group.id, &info.name))?;
        }
        Ok(())
    }

    /// Active keywords, optionally restricted to the requested words
    fn keyword_snapshot(&self, options: &CrawlOptions) -> CrawlResult<KeywordSet> {
        let mut keywords = self.with_storage(|s| s.get_active_keywords())?;

        if let Some(words) = &options.keywords {
            let wanted: Vec<String> = words.iter().map(|w| w.trim().to_lowercase()).collect();
            keywords.retain(|k| wanted.contains(&k.word.to_lowercase()));
            if keywords.len() < wanted.len() {
                tracing::warn!(
                    requested = wanted.len(),
                    known = keywords.len(),
                    "Some requested keywords are not configured and were ignored"
                );
            }
        }

        let rules: Vec<_> = keywords.iter().map(|k| k.rule()).collect();
        Ok(self.matcher.compile(&rules))
    }

    async fn process_post(
        &self,
        group_id: i64,
        post: &ExternalPost,
        keywords: &KeywordSet,
        options: &CrawlOptions,
        stop: &StopSignal,
        stats: &mut RunStats,
    ) -> CrawlResult<()> {
        let post_id = self.with_storage(|s| s.save_post(group_id, post))?;

        if options.force_reparse {
            self.reparse_stored(post_id, keywords, stats)?;
        }

        if post.comment_count() > 0 {
            match self
                .fetch_comments(group_id, post, post_id, keywords, stop, stats)
                .await
            {
                Ok(()) => {}
                Err(CrawlError::Api(e)) if !e.is_transient() => {
                    tracing::warn!(
                        group_id,
                        post_id = post.id,
                        error = %e,
                        "Skipping comments of post"
                    );
                    stats.posts_skipped += 1;
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }

        if stop.is_stopped() {
            return Ok(());
        }
        self.with_storage(|s| s.mark_post_processed(post_id))
    }

    async fn fetch_comments(
        &self,
        group_id: i64,
        post: &ExternalPost,
        post_id: i64,
        keywords: &KeywordSet,
        stop: &StopSignal,
        stats: &mut RunStats,
    ) -> CrawlResult<()> {
        let existing = self.with_storage(|s| s.existing_comment_ids(post_id))?;
        let mut offset = 0u32;

        loop {
            if stop.is_stopped() {
                return Ok(());
            }

            let page = api::get_comments_page(
                self.client.as_ref(),
                group_id,
                post.id,
                offset,
                self.page_size,
            )
            .await?;
            tracing::debug!(
                group_id,
                post_id = post.id,
                offset,
                returned = page.items.len(),
                "Fetched comments page"
            );

            for comment in &page.items {
                stats.comments_found += 1;
                if comment.is_deleted() || existing.contains(&comment.id) {
                    continue;
                }

                let hits = keywords.scan(&comment.text);
                let saved = self.with_storage(|s| s.save_comment(post_id, comment, &hits))?;
                if !saved.created {
                    continue;
                }

                stats.new_comments += 1;
                if !hits.is_empty() {
                    stats.comments_with_keywords += 1;
                }
                stats.keyword_matches += saved.inserted_matches();
            }

            let returned = page.items.len() as u32;
            offset += returned;
            if returned < self.page_size {
                return Ok(());
            }
        }
    }

    /// Re-scans stored comments of a post, recording only matches not yet stored
    fn reparse_stored(
        &self,
        post_id: i64,
        keywords: &KeywordSet,
        stats: &mut RunStats,
    ) -> CrawlResult<()> {
        let comments = self.with_storage(|s| s.comments_for_post(post_id))?;
        for comment in comments {
            let hits = keywords.scan(&comment.text);
            if hits.is_empty() {
                continue;
            }
            let inserted = self.with_storage(|s| s.add_matches(comment.id, &hits))?;
            stats.keyword_matches += inserted.iter().map(|(_, n)| n).sum::<u64>();
        }
        Ok(())
    }
}
