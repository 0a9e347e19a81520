//! Crawl task tracking
//!
//! Every crawl request is recorded as a [`Task`] that moves through a small
//! state machine:
//!
//! ```text
//! pending --start--> running --success--> completed
//!    |                  |----error------> failed
//!    |                  `----stop-------> stopped
//!    `-------stop-------------------------^
//! ```
//!
//! Terminal states are final. Tasks live in a [`TaskStore`]; the SQLite
//! backing is shared by every process that opens the same database file,
//! the memory backing only serves a single process.

mod memory;
mod registry;
mod sqlite;
mod store;

pub use memory::MemoryTaskStore;
pub use registry::TaskRegistry;
pub use sqlite::SqliteTaskStore;
pub use store::TaskStore;

use crate::crawler::RunStats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Smallest and largest page sizes accepted by task listings
pub const PER_PAGE_RANGE: (u32, u32) = (1, 100);

/// Errors raised by the task registry and its stores
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Task not found: {0}")]
    NotFound(Uuid),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Task store lock poisoned")]
    LockPoisoned,
}

/// Result type for task operations
pub type TaskResult<T> = Result<T, TaskError>;

/// Lifecycle status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Stopped,
}

impl TaskStatus {
    /// Returns true once the task can no longer change
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }

    /// Returns true if a task in this status may move to `next`
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Failed)
                | (Self::Pending, Self::Stopped)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Stopped)
        )
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "stopped" => Some(Self::Stopped),
            _ => None,
        }
    }

    pub fn all_statuses() -> [Self; 5] {
        [
            Self::Pending,
            Self::Running,
            Self::Completed,
            Self::Failed,
            Self::Stopped,
        ]
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Per-group progress of a running task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub groups_total: usize,
    pub groups_done: usize,
    pub current_group: Option<i64>,
}

/// A group that failed within a crawl, with its error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupFailure {
    pub group_id: i64,
    pub error: String,
}

/// One crawl invocation spanning one or more groups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub status: TaskStatus,
    pub priority: i64,
    pub group_ids: Vec<i64>,
    pub max_posts: Option<u32>,
    pub force_reparse: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub progress: TaskProgress,
    pub stats: RunStats,
    pub group_errors: Vec<GroupFailure>,
    pub error_message: Option<String>,
    pub config_hash: Option<String>,
}

impl Task {
    /// Creates a pending task for the given groups
    pub fn new(group_ids: Vec<i64>) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: TaskStatus::Pending,
            priority: 0,
            progress: TaskProgress {
                groups_total: group_ids.len(),
                ..TaskProgress::default()
            },
            group_ids,
            max_posts: None,
            force_reparse: false,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            stats: RunStats::default(),
            group_errors: Vec::new(),
            error_message: None,
            config_hash: None,
        }
    }

    /// Moves the task to `next`, stamping start/finish times
    ///
    /// Returns false (leaving the task untouched) if the transition is not allowed.
    pub fn transition(&mut self, next: TaskStatus, at: DateTime<Utc>) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        if next == TaskStatus::Running {
            self.started_at = Some(at);
        }
        if next.is_terminal() {
            self.finished_at = Some(at);
            self.progress.current_group = None;
        }
        true
    }

    /// Wall-clock duration of a finished task
    pub fn duration_secs(&self) -> Option<f64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64 / 1000.0),
            _ => None,
        }
    }
}

/// Filter for task listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub group_id: Option<i64>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        self.status.map_or(true, |s| task.status == s)
            && self.group_id.map_or(true, |g| task.group_ids.contains(&g))
    }
}

/// One page of a task listing, newest first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskPage {
    pub items: Vec<Task>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

/// Aggregates over all recorded tasks
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskStats {
    pub total_runs: u64,
    pub pending: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    pub stopped: u64,
    pub average_duration_secs: Option<f64>,
    pub total_posts: u64,
    pub total_posts_skipped: u64,
    pub total_comments: u64,
    pub total_new_comments: u64,
    pub total_keyword_matches: u64,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl TaskStats {
    /// Aggregates statistics over a set of tasks
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        let mut stats = Self::default();
        let mut durations = Vec::new();

        for task in tasks {
            stats.total_runs += 1;
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Stopped => stats.stopped += 1,
            }
            if let Some(duration) = task.duration_secs() {
                durations.push(duration);
            }
            stats.total_posts += task.stats.posts_processed;
            stats.total_posts_skipped += task.stats.posts_skipped;
            stats.total_comments += task.stats.comments_found;
            stats.total_new_comments += task.stats.new_comments;
            stats.total_keyword_matches += task.stats.keyword_matches;
            if task.started_at > stats.last_run_at {
                stats.last_run_at = task.started_at;
            }
        }

        if !durations.is_empty() {
            stats.average_duration_secs =
                Some(durations.iter().sum::<f64>() / durations.len() as f64);
        }

        stats
    }
}
