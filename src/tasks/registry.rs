//! Task registry: one object per process, passed to whoever needs it

use crate::config::{StorageConfig, TaskStoreKind};
use crate::crawler::RunStats;
use crate::tasks::{
    GroupFailure, MemoryTaskStore, SqliteTaskStore, Task, TaskFilter, TaskPage, TaskProgress,
    TaskResult, TaskStats, TaskStatus, TaskStore, PER_PAGE_RANGE,
};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Records crawl tasks and enforces their state machine
///
/// Cloning is cheap; clones share the same store.
#[derive(Clone)]
pub struct TaskRegistry {
    store: Arc<dyn TaskStore>,
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry").finish_non_exhaustive()
    }
}

impl TaskRegistry {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    /// Registry backed by process memory; single-process deployments only
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryTaskStore::new()))
    }

    /// Registry backed by a SQLite file shared with other processes
    pub fn sqlite(path: &Path) -> TaskResult<Self> {
        Ok(Self::new(Arc::new(SqliteTaskStore::open(path)?)))
    }

    /// Builds the registry selected by `[storage] task-store`
    pub fn from_config(config: &StorageConfig) -> TaskResult<Self> {
        match config.task_store {
            TaskStoreKind::Memory => Ok(Self::in_memory()),
            TaskStoreKind::Sqlite => Self::sqlite(Path::new(config.task_database_path())),
        }
    }

    /// Stores a task as-is
    pub fn put(&self, task: &Task) -> TaskResult<()> {
        self.store.put(task)
    }

    pub fn get(&self, id: Uuid) -> TaskResult<Option<Task>> {
        self.store.get(id)
    }

    /// Lists tasks newest first; `page` starts at 1 and `per_page` is clamped to 1..=100
    pub fn list(&self, filter: &TaskFilter, page: u32, per_page: u32) -> TaskResult<TaskPage> {
        let (min, max) = PER_PAGE_RANGE;
        self.store
            .list(filter, page.max(1), per_page.clamp(min, max))
    }

    /// The most recently started running task, if any
    pub fn current(&self) -> TaskResult<Option<Task>> {
        self.store.current()
    }

    /// Moves a pending task to running
    pub fn mark_running(&self, id: Uuid) -> TaskResult<bool> {
        let applied = self
            .store
            .update(id, &|task| task.transition(TaskStatus::Running, Utc::now()))?;
        if applied {
            tracing::info!(task_id = %id, "Task started");
        }
        Ok(applied)
    }

    /// Records progress of a running task
    pub fn update_progress(
        &self,
        id: Uuid,
        progress: &TaskProgress,
        stats: &RunStats,
    ) -> TaskResult<bool> {
        self.store.update(id, &|task| {
            if task.status != TaskStatus::Running {
                return false;
            }
            task.progress = progress.clone();
            task.stats = stats.clone();
            true
        })
    }

    /// Moves a running task to completed with its final statistics
    pub fn mark_completed(
        &self,
        id: Uuid,
        stats: &RunStats,
        group_errors: &[GroupFailure],
    ) -> TaskResult<bool> {
        let applied = self.store.update(id, &|task| {
            if !task.transition(TaskStatus::Completed, Utc::now()) {
                return false;
            }
            task.stats = stats.clone();
            task.progress.groups_done = task.progress.groups_total;
            task.group_errors = group_errors.to_vec();
            true
        })?;
        if applied {
            tracing::info!(task_id = %id, "Task completed");
        }
        Ok(applied)
    }

    /// Moves a pending or running task to failed, recording the error
    pub fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        stats: &RunStats,
        group_errors: &[GroupFailure],
    ) -> TaskResult<bool> {
        let applied = self.store.update(id, &|task| {
            if !task.transition(TaskStatus::Failed, Utc::now()) {
                return false;
            }
            task.error_message = Some(error.to_string());
            task.stats = stats.clone();
            task.group_errors = group_errors.to_vec();
            true
        })?;
        if applied {
            tracing::warn!(task_id = %id, error, "Task failed");
        }
        Ok(applied)
    }

    /// Stops a pending or running task
    ///
    /// Returns false if the task had already reached a terminal state.
    pub fn mark_stopped(&self, id: Uuid) -> TaskResult<bool> {
        let applied = self
            .store
            .update(id, &|task| task.transition(TaskStatus::Stopped, Utc::now()))?;
        if applied {
            tracing::info!(task_id = %id, "Task stopped");
        }
        Ok(applied)
    }

    /// Stops the current running task, returning its id if one was stopped
    pub fn stop_current(&self) -> TaskResult<Option<Uuid>> {
        match self.current()? {
            Some(task) if self.mark_stopped(task.id)? => Ok(Some(task.id)),
            _ => Ok(None),
        }
    }

    /// Returns true if the task has been stopped
    pub fn is_stopped(&self, id: Uuid) -> TaskResult<bool> {
        Ok(self
            .store
            .get(id)?
            .map_or(false, |task| task.status == TaskStatus::Stopped))
    }

    /// Aggregated statistics over every recorded task
    pub fn stats(&self) -> TaskResult<TaskStats> {
        Ok(TaskStats::from_tasks(&self.store.all()?))
    }
}
