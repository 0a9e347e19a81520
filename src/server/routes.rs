//! Request handlers and JSON error rendering

use crate::crawler::{BulkConfig, BulkResult, CrawlError, CrawlOptions};
use crate::server::AppState;
use crate::storage::{self, Storage, StorageError};
use crate::tasks::{Task, TaskError, TaskFilter, TaskPage, TaskStats, TaskStatus};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Error returned to HTTP clients as `{"error": "..."}`
#[derive(Debug)]
pub enum ServerError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            Self::NotFound(m) => (StatusCode::NOT_FOUND, m),
            Self::Internal(m) => {
                tracing::error!(error = %m, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, m)
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<CrawlError> for ServerError {
    fn from(err: CrawlError) -> Self {
        match err {
            CrawlError::GroupNotFound(_) => Self::NotFound(err.to_string()),
            CrawlError::GroupInactive(_) => Self::BadRequest(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<TaskError> for ServerError {
    fn from(err: TaskError) -> Self {
        match err {
            TaskError::NotFound(_) => Self::NotFound(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<StorageError> for ServerError {
    fn from(err: StorageError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<JsonRejection> for ServerError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

type HandlerResult<T> = Result<Json<T>, ServerError>;

#[derive(Debug, Deserialize)]
pub struct ParseRequest {
    pub group_id: i64,
    pub max_posts: Option<u32>,
    pub keywords: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct ParseResponse {
    pub task_id: Uuid,
    pub status: TaskStatus,
}

#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<Task>,
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub stopped: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct TasksQuery {
    pub status: Option<String>,
    pub group_id: Option<i64>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

pub async fn parse_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ParseRequest>, JsonRejection>,
) -> HandlerResult<ParseResponse> {
    let Json(request) = body?;

    let group = storage::lock(state.orchestrator.worker().storage())?
        .get_group(request.group_id)?
        .ok_or(CrawlError::GroupNotFound(request.group_id))?;
    if !group.is_active {
        return Err(CrawlError::GroupInactive(group.id).into());
    }

    let options = CrawlOptions {
        max_posts: request.max_posts,
        force_reparse: false,
        keywords: request.keywords,
    };
    let handle = state.orchestrator.start(vec![group.id], options)?;
    let status = state
        .registry
        .get(handle.id())?
        .map_or(TaskStatus::Pending, |t| t.status);

    Ok(Json(ParseResponse {
        task_id: handle.id(),
        status,
    }))
}

pub async fn bulk_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<BulkConfig>, JsonRejection>,
) -> HandlerResult<BulkResult> {
    let Json(config) = body?;
    if config.max_concurrent == Some(0) {
        return Err(ServerError::BadRequest(
            "max_concurrent must be at least 1".to_string(),
        ));
    }
    Ok(Json(state.orchestrator.start_bulk(config).await?))
}

pub async fn state_handler(State(state): State<Arc<AppState>>) -> HandlerResult<StateResponse> {
    let task = state.registry.current()?;
    Ok(Json(StateResponse {
        status: if task.is_some() { "running" } else { "idle" },
        task,
    }))
}

pub async fn stats_handler(State(state): State<Arc<AppState>>) -> HandlerResult<TaskStats> {
    Ok(Json(state.registry.stats()?))
}

pub async fn tasks_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TasksQuery>,
) -> HandlerResult<TaskPage> {
    let status = match query.status.as_deref() {
        None | Some("") => None,
        Some(s) => Some(
            TaskStatus::from_db_string(s)
                .ok_or_else(|| ServerError::BadRequest(format!("Unknown task status: {}", s)))?,
        ),
    };
    let filter = TaskFilter {
        status,
        group_id: query.group_id,
    };

    Ok(Json(state.registry.list(
        &filter,
        query.page.unwrap_or(1),
        query.per_page.unwrap_or(20),
    )?))
}

pub async fn task_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> HandlerResult<Task> {
    let id = Uuid::parse_str(&id)
        .map_err(|_| ServerError::BadRequest(format!("Invalid task id: {}", id)))?;
    let task = state.registry.get(id)?.ok_or(TaskError::NotFound(id))?;
    Ok(Json(task))
}

pub async fn stop_handler(State(state): State<Arc<AppState>>) -> HandlerResult<StopResponse> {
    Ok(Json(StopResponse {
        stopped: state.orchestrator.stop_current()?,
    }))
}
