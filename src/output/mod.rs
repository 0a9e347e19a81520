//! Output module for statistics and monitoring reports
//!
//! This module handles:
//! - Collecting a [`MonitorSummary`] from content storage and the task registry
//! - Printing statistics to the terminal
//! - Exporting a markdown report

mod markdown;
pub mod stats;

pub use markdown::{format_markdown_report, generate_markdown_report};
pub use stats::{format_statistics, print_statistics};

use crate::storage::{GroupRecord, KeywordRecord, Storage, StorageCounts, StorageError};
use crate::tasks::{Task, TaskError, TaskFilter, TaskRegistry, TaskStats};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Tasks listed in a report
pub const RECENT_TASKS: u32 = 10;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Task registry error: {0}")]
    Task(#[from] TaskError),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Snapshot of everything a report shows
#[derive(Debug, Clone)]
pub struct MonitorSummary {
    pub generated_at: DateTime<Utc>,
    pub task_stats: TaskStats,
    pub counts: StorageCounts,
    pub groups: Vec<GroupRecord>,
    /// Most matched first
    pub keywords: Vec<KeywordRecord>,
    /// Newest first
    pub recent_tasks: Vec<Task>,
}

/// Generates a monitoring summary
///
/// # Arguments
///
/// * `storage` - Content storage holding groups, comments and keywords
/// * `registry` - Task registry holding crawl history
///
/// # Returns
///
/// * `Ok(MonitorSummary)` - Successfully collected summary
/// * `Err(OutputError)` - Failed to query storage or the registry
pub fn generate_summary(
    storage: &dyn Storage,
    registry: &TaskRegistry,
) -> OutputResult<MonitorSummary> {
    let recent = registry.list(&TaskFilter::default(), 1, RECENT_TASKS)?;

    Ok(MonitorSummary {
        generated_at: Utc::now(),
        task_stats: registry.stats()?,
        counts: storage.counts()?,
        groups: storage.list_groups()?,
        keywords: storage.list_keywords()?,
        recent_tasks: recent.items,
    })
}
