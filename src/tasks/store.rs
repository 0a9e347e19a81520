//! Task store interface

use crate::tasks::{Task, TaskFilter, TaskPage, TaskResult};
use uuid::Uuid;

/// Persistence backing for the task registry
///
/// Implementations must make `update` atomic: the closure sees the latest
/// stored task and its changes are written only if it returns true, with no
/// other writer interleaving. The registry builds every status transition on
/// top of this.
pub trait TaskStore: Send + Sync {
    /// Inserts a task, replacing any task with the same id
    fn put(&self, task: &Task) -> TaskResult<()>;

    /// Gets a task by id
    fn get(&self, id: Uuid) -> TaskResult<Option<Task>>;

    /// Lists tasks newest first
    ///
    /// `page` starts at 1; callers clamp `per_page`.
    fn list(&self, filter: &TaskFilter, page: u32, per_page: u32) -> TaskResult<TaskPage>;

    /// Atomically reads, modifies and writes back one task
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The closure accepted the change and it was stored
    /// * `Ok(false)` - The closure declined; nothing was written
    /// * `Err(TaskError::NotFound)` - No task with this id
    fn update(&self, id: Uuid, apply: &dyn Fn(&mut Task) -> bool) -> TaskResult<bool>;

    /// The most recently started running task
    fn current(&self) -> TaskResult<Option<Task>>;

    /// Every stored task, oldest first
    fn all(&self) -> TaskResult<Vec<Task>>;
}
