//! HTTP surface for starting, inspecting and stopping crawls
//!
//! | Route | Effect |
//! |-------|--------|
//! | `POST /parse` | Starts a crawl of one group in the background |
//! | `POST /parse/bulk` | Crawls many groups with bounded concurrency, waits for them |
//! | `GET /state` | Current running task, if any |
//! | `GET /stats` | Aggregated task statistics |
//! | `GET /tasks` | Paginated task listing |
//! | `GET /tasks/{id}` | One task |
//! | `POST /stop` | Stops the current running task |

mod routes;

use crate::crawler::CrawlOrchestrator;
use crate::tasks::TaskRegistry;
use crate::WatchError;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: CrawlOrchestrator,
    pub registry: TaskRegistry,
}

impl AppState {
    pub fn new(orchestrator: CrawlOrchestrator) -> Self {
        let registry = orchestrator.registry().clone();
        Self {
            orchestrator,
            registry,
        }
    }
}

/// Builds the router
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/parse", post(routes::parse_handler))
        .route("/parse/bulk", post(routes::bulk_handler))
        .route("/state", get(routes::state_handler))
        .route("/stats", get(routes::stats_handler))
        .route("/tasks", get(routes::tasks_handler))
        .route("/tasks/{id}", get(routes::task_handler))
        .route("/stop", post(routes::stop_handler))
        .with_state(Arc::new(state))
}

/// Serves the router on `bind` until the process ends
pub async fn serve(state: AppState, bind: &str) -> Result<(), WatchError> {
    let listener = TcpListener::bind(bind).await?;
    tracing::info!(bind, "HTTP server listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}
