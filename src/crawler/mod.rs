//! Crawler module for community walls
//!
//! This module contains the core crawling logic, including:
//! - [`CrawlWorker`]: one group's posts and comments, keyword matching and persistence
//! - [`CrawlOrchestrator`]: task bookkeeping and bounded concurrent crawls
//! - [`StopSignal`]: cooperative cancellation checked between pages

#[cfg(test)]
pub(crate) mod fake;
mod orchestrator;
mod worker;

pub use orchestrator::{BulkConfig, BulkResult, CrawlOrchestrator, TaskHandle};
pub use worker::{CrawlWorker, RunStats};

use crate::api::ApiError;
use crate::storage::StorageError;
use crate::tasks::{TaskError, TaskRegistry};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Errors that abort the crawl of a group
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Group {0} is not configured")]
    GroupNotFound(i64),

    #[error("Group {0} is inactive")]
    GroupInactive(i64),

    #[error("Group {group_id} is unavailable upstream: {reason}")]
    GroupUnavailable { group_id: i64, reason: String },

    #[error("Upstream API error: {0}")]
    Api(#[from] ApiError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Task registry error: {0}")]
    Task(#[from] TaskError),

    #[error("Crawl task panicked or was cancelled: {0}")]
    Join(String),
}

/// Result type for crawl operations
pub type CrawlResult<T> = Result<T, CrawlError>;

/// Per-request crawl options
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CrawlOptions {
    /// Overrides each group's configured post limit
    pub max_posts: Option<u32>,
    /// Re-scan already stored comments against the current keywords
    #[serde(default)]
    pub force_reparse: bool,
    /// Restricts matching to these configured keywords
    pub keywords: Option<Vec<String>>,
}

type StopCheck = Arc<dyn Fn() -> bool + Send + Sync>;

/// Cooperative stop flag shared by a task's crawl workers
///
/// A signal tied to a task also reports stopped once the task's stored
/// status is `stopped`, which lets another process stop the crawl.
#[derive(Clone, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
    check: Option<StopCheck>,
}

impl std::fmt::Debug for StopSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopSignal")
            .field("stopped", &self.flag.load(Ordering::SeqCst))
            .finish()
    }
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal that also watches the stored status of a task
    pub fn for_task(registry: TaskRegistry, task_id: Uuid) -> Self {
        let check: StopCheck = Arc::new(move || match registry.is_stopped(task_id) {
            Ok(stopped) => stopped,
            Err(e) => {
                tracing::warn!(task_id = %task_id, error = %e, "Failed to read task status");
                false
            }
        });
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            check: Some(check),
        }
    }

    /// Requests a stop
    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        if self.flag.load(Ordering::SeqCst) {
            return true;
        }
        let stopped = self.check.as_ref().map_or(false, |check| check());
        if stopped {
            self.flag.store(true, Ordering::SeqCst);
        }
        stopped
    }
}
