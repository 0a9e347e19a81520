//! Crawl orchestration: tasks around workers, bounded bulk crawls
//!
//! [`CrawlOrchestrator::start`] records one task for a list of groups and
//! crawls them one after another in the background. A group failure is
//! recorded on the task without stopping the remaining groups; the task only
//! fails when every group failed.
//!
//! [`CrawlOrchestrator::start_bulk`] records one task per group and runs them
//! concurrently, never more than `max_concurrent` at once. Worker slots are
//! taken before a task is spawned, so tasks start in the order the groups
//! were given.

use crate::api::{HttpApiClient, RateLimitedClient};
use crate::config::Config;
use crate::crawler::{CrawlError, CrawlOptions, CrawlResult, CrawlWorker, RunStats, StopSignal};
use crate::matching::KeywordMatcher;
use crate::storage::{self, SharedStorage, Storage};
use crate::WatchError;
use crate::tasks::{GroupFailure, Task, TaskError, TaskProgress, TaskRegistry, TaskStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Parameters for a bulk crawl
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BulkConfig {
    /// Concurrent worker limit; the orchestrator default when absent
    pub max_concurrent: Option<usize>,
    pub max_posts: Option<u32>,
    #[serde(default)]
    pub force_reparse: bool,
    /// Groups to crawl; every active group when absent
    pub group_ids: Option<Vec<i64>>,
}

/// Outcome of a bulk crawl
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkResult {
    pub total_groups: usize,
    pub started_tasks: usize,
    pub failed_groups: Vec<GroupFailure>,
    pub tasks: Vec<Task>,
}

/// Handle to a crawl task running in the background
#[derive(Debug)]
pub struct TaskHandle {
    id: Uuid,
    stop: StopSignal,
    join: JoinHandle<CrawlResult<Task>>,
}

impl TaskHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Asks the crawl to stop at its next page boundary
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Waits for the task to finish and returns its final record
    pub async fn wait(self) -> CrawlResult<Task> {
        self.join
            .await
            .map_err(|e| CrawlError::Join(e.to_string()))?
    }
}

/// Starts crawl tasks and tracks them in the registry
#[derive(Clone)]
pub struct CrawlOrchestrator {
    worker: Arc<CrawlWorker>,
    registry: TaskRegistry,
    max_concurrent: usize,
    config_hash: Option<String>,
}

impl CrawlOrchestrator {
    pub fn new(worker: Arc<CrawlWorker>, registry: TaskRegistry, max_concurrent: usize) -> Self {
        Self {
            worker,
            registry,
            max_concurrent: max_concurrent.max(1),
            config_hash: None,
        }
    }

    /// Wires the HTTP client, rate limiter, matcher and worker from configuration
    pub fn from_config(
        config: &Config,
        storage: SharedStorage,
        registry: TaskRegistry,
    ) -> Result<Self, WatchError> {
        let http = HttpApiClient::new(&config.api)?;
        let client = RateLimitedClient::from_config(http, &config.api);
        let matcher = if config.crawler.morphology {
            KeywordMatcher::default()
        } else {
            KeywordMatcher::literal()
        };
        let worker = CrawlWorker::new(
            Arc::new(client),
            storage,
            matcher,
            config.crawler.page_size,
        );

        Ok(Self::new(
            Arc::new(worker),
            registry,
            config.crawler.max_concurrent as usize,
        ))
    }

    /// Records this configuration hash on every task created
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn worker(&self) -> &Arc<CrawlWorker> {
        &self.worker
    }

    /// Stops the most recently started running task
    pub fn stop_current(&self) -> CrawlResult<bool> {
        Ok(self.registry.stop_current()?.is_some())
    }

    fn new_task(&self, group_ids: Vec<i64>, options: &CrawlOptions, priority: i64) -> Task {
        let mut task = Task::new(group_ids);
        task.priority = priority;
        task.max_posts = options.max_posts;
        task.force_reparse = options.force_reparse;
        task.config_hash = self.config_hash.clone();
        task
    }

    /// Records a pending task for `group_ids` and crawls them in the background
    ///
    /// # Returns
    ///
    /// A handle to the running task; the task itself is already stored.
    pub fn start(&self, group_ids: Vec<i64>, options: CrawlOptions) -> CrawlResult<TaskHandle> {
        let task = self.new_task(group_ids, &options, 0);
        self.registry.put(&task)?;

        let id = task.id;
        let stop = StopSignal::for_task(self.registry.clone(), id);
        let join = tokio::spawn(run_task(
            self.worker.clone(),
            self.registry.clone(),
            task,
            options,
            stop.clone(),
            None,
        ));

        Ok(TaskHandle { id, stop, join })
    }

    /// Crawls many groups, one task each, at most `max_concurrent` at a time
    ///
    /// Waits for every task to finish. A group's failure never affects its
    /// siblings; failures are collected in `failed_groups`.
    pub async fn start_bulk(&self, config: BulkConfig) -> CrawlResult<BulkResult> {
        let group_ids = match config.group_ids {
            Some(ids) => ids,
            None => storage::lock(self.worker.storage())?
                .list_active_groups()?
                .into_iter()
                .map(|g| g.id)
                .collect(),
        };
        let max_concurrent = config.max_concurrent.unwrap_or(self.max_concurrent).max(1);
        let options = CrawlOptions {
            max_posts: config.max_posts,
            force_reparse: config.force_reparse,
            keywords: None,
        };

        tracing::info!(
            groups = group_ids.len(),
            max_concurrent,
            "Starting bulk crawl"
        );

        let mut queued = Vec::with_capacity(group_ids.len());
        for (index, &group_id) in group_ids.iter().enumerate() {
            let task = self.new_task(vec![group_id], &options, index as i64);
            self.registry.put(&task)?;
            queued.push((group_id, task));
        }

        let semaphore = Arc::new(Semaphore::new(max_concurrent));
        let mut handles = Vec::with_capacity(queued.len());

        for (group_id, task) in queued {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| CrawlError::Join(e.to_string()))?;

            let stop = StopSignal::for_task(self.registry.clone(), task.id);
            let join = tokio::spawn(run_task(
                self.worker.clone(),
                self.registry.clone(),
                task,
                options.clone(),
                stop,
                Some(permit),
            ));
            handles.push((group_id, join));
        }

        let started_tasks = handles.len();
        let mut failed_groups = Vec::new();
        let mut tasks = Vec::with_capacity(started_tasks);

        for (group_id, join) in handles {
            match join.await {
                Ok(Ok(task)) => {
                    if task.status == TaskStatus::Failed {
                        let error = task
                            .group_errors
                            .first()
                            .map(|f| f.error.clone())
                            .or_else(|| task.error_message.clone())
                            .unwrap_or_else(|| "unknown error".to_string());
                        failed_groups.push(GroupFailure { group_id, error });
                    }
                    tasks.push(task);
                }
                Ok(Err(e)) => failed_groups.push(GroupFailure {
                    group_id,
                    error: e.to_string(),
                }),
                Err(e) => failed_groups.push(GroupFailure {
                    group_id,
                    error: CrawlError::Join(e.to_string()).to_string(),
                }),
            }
        }

        tracing::info!(
            total = group_ids.len(),
            failed = failed_groups.len(),
            "Bulk crawl finished"
        );

        Ok(BulkResult {
            total_groups: group_ids.len(),
            started_tasks,
            failed_groups,
            tasks,
        })
    }
}

/// Runs one task to completion, recording unexpected errors on the task
///
/// `permit` is the bulk worker slot, released when the task finishes.
async fn run_task(
    worker: Arc<CrawlWorker>,
    registry: TaskRegistry,
    task: Task,
    options: CrawlOptions,
    stop: StopSignal,
    permit: Option<OwnedSemaphorePermit>,
) -> CrawlResult<Task> {
    let id = task.id;
    let result = crawl_groups(&worker, &registry, task, &options, &stop).await;
    drop(permit);

    if let Err(e) = result {
        tracing::error!(task_id = %id, error = %e, "Crawl task aborted");
        if !registry.mark_failed(id, &e.to_string(), &RunStats::default(), &[])? {
            tracing::warn!(task_id = %id, "Task already finished, error not recorded");
        }
    }
    registry.get(id)?.ok_or(CrawlError::Task(TaskError::NotFound(id)))
}

async fn crawl_groups(
    worker: &CrawlWorker,
    registry: &TaskRegistry,
    task: Task,
    options: &CrawlOptions,
    stop: &StopSignal,
) -> CrawlResult<()> {
    if !registry.mark_running(task.id)? {
        tracing::info!(task_id = %task.id, "Task was stopped before it started");
        return Ok(());
    }

    let mut totals = RunStats::default();
    let mut failures = Vec::new();
    let mut progress = TaskProgress {
        groups_total: task.group_ids.len(),
        ..TaskProgress::default()
    };

    for &group_id in &task.group_ids {
        if stop.is_stopped() {
            break;
        }

        progress.current_group = Some(group_id);
        registry.update_progress(task.id, &progress, &totals)?;

        match worker.run(group_id, options, stop).await {
            Ok(stats) => totals.merge(&stats),
            Err(e) => {
                tracing::error!(task_id = %task.id, group_id, error = %e, "Group crawl failed");
                failures.push(GroupFailure {
                    group_id,
                    error: e.to_string(),
                });
            }
        }

        progress.groups_done += 1;
        registry.update_progress(task.id, &progress, &totals)?;
    }

    if stop.is_stopped() {
        registry.mark_stopped(task.id)?;
    } else if !failures.is_empty() && failures.len() == task.group_ids.len() {
        let message = if failures.len() == 1 {
            failures[0].error.clone()
        } else {
            format!("all {} groups failed", failures.len())
        };
        registry.mark_failed(task.id, &message, &totals, &failures)?;
    } else {
        registry.mark_completed(task.id, &totals, &failures)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::fake::FakeApi;
    use crate::matching::KeywordMatcher;
    use crate::storage::{SharedStorage, SqliteStorage};
    use crate::tasks::{MemoryTaskStore, TaskFilter, TaskPage, TaskResult, TaskStore};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Memory store whose first update fails
    #[derive(Default)]
    struct FailFirstUpdate {
        inner: MemoryTaskStore,
        failed: AtomicBool,
    }

    impl TaskStore for FailFirstUpdate {
        fn put(&self, task: &Task) -> TaskResult<()> {
            self.inner.put(task)
        }

        fn get(&self, id: Uuid) -> TaskResult<Option<Task>> {
            self.inner.get(id)
        }

        fn list(&self, filter: &TaskFilter, page: u32, per_page: u32) -> TaskResult<TaskPage> {
            self.inner.list(filter, page, per_page)
        }

        fn update(&self, id: Uuid, apply: &dyn Fn(&mut Task) -> bool) -> TaskResult<bool> {
            if !self.failed.swap(true, Ordering::SeqCst) {
                return Err(TaskError::LockPoisoned);
            }
            self.inner.update(id, apply)
        }

        fn current(&self) -> TaskResult<Option<Task>> {
            self.inner.current()
        }

        fn all(&self) -> TaskResult<Vec<Task>> {
            self.inner.all()
        }
    }

    fn setup(api: Arc<FakeApi>, groups: &[i64]) -> (CrawlOrchestrator, SharedStorage) {
        setup_with_registry(api, groups, TaskRegistry::in_memory())
    }

    fn setup_with_registry(
        api: Arc<FakeApi>,
        groups: &[i64],
        registry: TaskRegistry,
    ) -> (CrawlOrchestrator, SharedStorage) {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        for &id in groups {
            storage.upsert_group(id, None, 50, true).unwrap();
        }
        storage.upsert_keyword("спам", false, true, true).unwrap();
        let storage: SharedStorage = Arc::new(Mutex::new(storage));

        let worker = CrawlWorker::new(api, storage.clone(), KeywordMatcher::default(), 100);
        let orchestrator = CrawlOrchestrator::new(Arc::new(worker), registry, 2);
        (orchestrator, storage)
    }

    #[tokio::test]
    async fn test_start_runs_task_to_completion() {
        let api = Arc::new(
            FakeApi::new()
                .post(1, 10, &[(1, "спам")])
                .post(2, 20, &[(2, "спам"), (3, "ничего")]),
        );
        let (orchestrator, _) = setup(api, &[1, 2]);

        let handle = orchestrator
            .with_config_hash("abc123")
            .start(vec![1, 2], CrawlOptions::default())
            .unwrap();
        let task = handle.wait().await.unwrap();

        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.stats.posts_processed, 2);
        assert_eq!(task.stats.new_comments, 3);
        assert_eq!(task.stats.keyword_matches, 2);
        assert_eq!(task.progress.groups_done, 2);
        assert_eq!(task.config_hash.as_deref(), Some("abc123"));
        assert!(task.group_errors.is_empty());
        assert!(task.started_at.is_some() && task.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_failed_group_does_not_affect_others() {
        let api = Arc::new(
            FakeApi::new()
                .post(1, 10, &[(1, "спам")])
                .unavailable(2)
                .post(3, 30, &[(2, "спам")]),
        );
        let (orchestrator, _) = setup(api, &[1, 2, 3]);

        let task = orchestrator
            .start(vec![1, 2, 3], CrawlOptions::default())
            .unwrap()
            .wait()
            .await
            .unwrap();

        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.stats.new_comments, 2);
        assert_eq!(task.group_errors.len(), 1);
        assert_eq!(task.group_errors[0].group_id, 2);
    }

    #[tokio::test]
    async fn test_all_groups_failing_fails_task() {
        let api = Arc::new(FakeApi::new().unavailable(2));
        let (orchestrator, _) = setup(api, &[2]);

        let task = orchestrator
            .start(vec![2, 99], CrawlOptions::default())
            .unwrap()
            .wait()
            .await
            .unwrap();

        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error_message.as_deref(), Some("all 2 groups failed"));
        assert_eq!(task.group_errors.len(), 2);
    }

    #[tokio::test]
    async fn test_stop_through_handle() {
        let api = Arc::new(FakeApi::new().post(1, 10, &[(1, "спам")]));
        let (orchestrator, storage) = setup(api, &[1]);

        let handle = orchestrator
            .start(vec![1], CrawlOptions::default())
            .unwrap();
        handle.stop();
        let task = handle.wait().await.unwrap();

        assert_eq!(task.status, TaskStatus::Stopped);
        assert_eq!(storage::lock(&storage).unwrap().counts().unwrap().comments, 0);
    }

    #[tokio::test]
    async fn test_stopped_while_pending_never_runs() {
        let api = Arc::new(FakeApi::new().post(1, 10, &[(1, "спам")]));
        let (orchestrator, _) = setup(api.clone(), &[1]);

        let handle = orchestrator
            .start(vec![1], CrawlOptions::default())
            .unwrap();
        assert!(orchestrator.registry().mark_stopped(handle.id()).unwrap());
        let task = handle.wait().await.unwrap();

        assert_eq!(task.status, TaskStatus::Stopped);
        assert!(task.started_at.is_none());
        assert_eq!(api.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bulk_never_exceeds_max_concurrent() {
        let mut api = FakeApi::new().with_delay(Duration::from_millis(200));
        let groups: Vec<i64> = (1..=10).collect();
        for &group in &groups {
            api = api.post(group, group * 100, &[(group, "спам")]);
        }
        let api = Arc::new(api);
        let (orchestrator, _) = setup(api.clone(), &groups);

        let result = orchestrator
            .start_bulk(BulkConfig {
                max_concurrent: Some(3),
                ..BulkConfig::default()
            })
            .await
            .unwrap();

        assert!(api.peak() <= 3, "peak in-flight calls was {}", api.peak());
        assert!(api.peak() > 1);
        assert_eq!(result.total_groups, 10);
        assert_eq!(result.started_tasks, 10);
        assert!(result.failed_groups.is_empty());
        assert!(result
            .tasks
            .iter()
            .all(|t| t.status == TaskStatus::Completed && t.stats.new_comments == 1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_bulk_starts_groups_in_given_order() {
        let groups: Vec<i64> = (1..=6).collect();
        let mut api = FakeApi::new();
        for &group in &groups {
            api = api.post(group, group * 10, &[(group, "спам")]);
        }
        let api = Arc::new(api);
        let (orchestrator, _) = setup(api.clone(), &groups);

        let bulk = tokio::spawn(async move {
            orchestrator
                .start_bulk(BulkConfig {
                    max_concurrent: Some(1),
                    group_ids: Some(groups),
                    ..BulkConfig::default()
                })
                .await
        });
        let result = bulk.await.unwrap().unwrap();

        assert!(result.failed_groups.is_empty());
        assert_eq!(api.group_order(), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(api.peak(), 1);
    }

    #[tokio::test]
    async fn test_task_fails_when_start_cannot_be_recorded() {
        let api = Arc::new(FakeApi::new().post(1, 10, &[(1, "спам")]));
        let registry = TaskRegistry::new(Arc::new(FailFirstUpdate::default()));
        let (orchestrator, _) = setup_with_registry(api.clone(), &[1], registry);

        let task = orchestrator
            .start(vec![1], CrawlOptions::default())
            .unwrap()
            .wait()
            .await
            .unwrap();

        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(
            task.error_message.as_deref(),
            Some("Task registry error: Task store lock poisoned")
        );
        assert!(task.started_at.is_none());
        assert_eq!(api.calls(), 0);
    }

    #[tokio::test]
    async fn test_bulk_reports_task_that_could_not_start() {
        let api = Arc::new(
            FakeApi::new()
                .post(1, 10, &[(1, "спам")])
                .post(2, 20, &[(2, "спам")]),
        );
        let registry = TaskRegistry::new(Arc::new(FailFirstUpdate::default()));
        let (orchestrator, _) = setup_with_registry(api, &[1, 2], registry);

        let result = orchestrator
            .start_bulk(BulkConfig {
                max_concurrent: Some(1),
                group_ids: Some(vec![1, 2]),
                ..BulkConfig::default()
            })
            .await
            .unwrap();

        assert_eq!(result.failed_groups.len(), 1);
        assert_eq!(result.failed_groups[0].group_id, 1);
        let statuses: Vec<TaskStatus> = result.tasks.iter().map(|t| t.status).collect();
        assert_eq!(statuses, vec![TaskStatus::Failed, TaskStatus::Completed]);
        assert_eq!(orchestrator.registry().stats().unwrap().pending, 0);
    }

    #[tokio::test]
    async fn test_bulk_isolates_failures() {
        let api = Arc::new(
            FakeApi::new()
                .post(1, 10, &[(1, "спам")])
                .unavailable(2)
                .post(3, 30, &[(2, "спам")]),
        );
        let (orchestrator, storage) = setup(api, &[1, 2, 3]);

        let result = orchestrator
            .start_bulk(BulkConfig {
                group_ids: Some(vec![1, 2, 3]),
                ..BulkConfig::default()
            })
            .await
            .unwrap();

        assert_eq!(result.started_tasks, 3);
        assert_eq!(result.failed_groups.len(), 1);
        assert_eq!(result.failed_groups[0].group_id, 2);
        let statuses: Vec<TaskStatus> = result.tasks.iter().map(|t| t.status).collect();
        assert_eq!(
            statuses,
            vec![TaskStatus::Completed, TaskStatus::Failed, TaskStatus::Completed]
        );
        let priorities: Vec<i64> = result.tasks.iter().map(|t| t.priority).collect();
        assert_eq!(priorities, vec![0, 1, 2]);
        assert_eq!(storage::lock(&storage).unwrap().counts().unwrap().comments, 2);
    }

    #[tokio::test]
    async fn test_bulk_is_idempotent() {
        let api = Arc::new(
            FakeApi::new()
                .post(1, 10, &[(1, "спам"), (2, "спам спам")])
                .post(2, 20, &[(3, "тихо")]),
        );
        let (orchestrator, storage) = setup(api, &[1, 2]);

        orchestrator.start_bulk(BulkConfig::default()).await.unwrap();
        let first = storage::lock(&storage).unwrap().counts().unwrap();
        let second_run = orchestrator.start_bulk(BulkConfig::default()).await.unwrap();
        let second = storage::lock(&storage).unwrap().counts().unwrap();

        assert_eq!(first, second);
        assert_eq!(first.comments, 3);
        assert_eq!(first.keyword_matches, 3);
        assert!(second_run.tasks.iter().all(|t| t.stats.new_comments == 0));
        assert_eq!(orchestrator.registry().stats().unwrap().completed, 4);
    }

    #[tokio::test]
    async fn test_stop_current_without_running_task() {
        let (orchestrator, _) = setup(Arc::new(FakeApi::new()), &[]);
        assert!(!orchestrator.stop_current().unwrap());
    }
}
