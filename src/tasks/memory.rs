//! In-process task store
//!
//! Tasks are only visible to the process that created them and are lost on
//! restart. Use it for single-process deployments and tests; anything with
//! more than one worker process needs [`super::SqliteTaskStore`].

use crate::tasks::store::TaskStore;
use crate::tasks::{Task, TaskError, TaskFilter, TaskPage, TaskResult, TaskStatus};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Task store held in memory, in insertion order
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    tasks: Mutex<Vec<Task>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> TaskResult<MutexGuard<'_, Vec<Task>>> {
        self.tasks.lock().map_err(|_| TaskError::LockPoisoned)
    }
}

impl TaskStore for MemoryTaskStore {
    fn put(&self, task: &Task) -> TaskResult<()> {
        let mut tasks = self.lock()?;
        match tasks.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => *existing = task.clone(),
            None => tasks.push(task.clone()),
        }
        Ok(())
    }

    fn get(&self, id: Uuid) -> TaskResult<Option<Task>> {
        Ok(self.lock()?.iter().find(|t| t.id == id).cloned())
    }

    fn list(&self, filter: &TaskFilter, page: u32, per_page: u32) -> TaskResult<TaskPage> {
        let tasks = self.lock()?;
        let matching: Vec<&Task> = tasks.iter().rev().filter(|t| filter.matches(t)).collect();
        let offset = (page.saturating_sub(1) as usize).saturating_mul(per_page as usize);

        Ok(TaskPage {
            total: matching.len() as u64,
            items: matching
                .into_iter()
                .skip(offset)
                .take(per_page as usize)
                .cloned()
                .collect(),
            page,
            per_page,
        })
    }

    fn update(&self, id: Uuid, apply: &dyn Fn(&mut Task) -> bool) -> TaskResult<bool> {
        let mut tasks = self.lock()?;
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(TaskError::NotFound(id))?;

        let mut candidate = task.clone();
        if !apply(&mut candidate) {
            return Ok(false);
        }
        *task = candidate;
        Ok(true)
    }

    fn current(&self) -> TaskResult<Option<Task>> {
        Ok(self
            .lock()?
            .iter()
            .filter(|t| t.status == TaskStatus::Running)
            .max_by_key(|t| t.started_at)
            .cloned())
    }

    fn all(&self) -> TaskResult<Vec<Task>> {
        Ok(self.lock()?.clone())
    }
}
