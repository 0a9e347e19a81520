//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the upstream method endpoint and
//! run the full crawl cycle end-to-end: HTTP client, rate limiter, worker,
//! SQLite storage and the SQLite task registry.

use serde_json::{json, Value};
use std::path::Path;
use wallwatch::api::{ApiClient, ApiError, HttpApiClient, Params, RateLimitedClient};
use wallwatch::config::{parse_config, Config};
use wallwatch::crawler::{BulkConfig, CrawlOptions};
use wallwatch::storage::{self, SharedStorage, Storage};
use wallwatch::tasks::{TaskRegistry, TaskStatus};
use wallwatch::CrawlOrchestrator;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointing at the mock server
fn create_test_config(server_uri: &str, db_path: &Path) -> Config {
    let text = format!(
        r#"
[api]
base-url = "{}/method"
access-token = "test-token"
requests-per-second = 50
max-retries = 2
rate-limit-backoff-ms = 10
flood-control-backoff-ms = 10
network-backoff-ms = 10

[crawler]
page-size = 100
max-concurrent = 2

[storage]
database-path = "{}"

[[group]]
id = 101

[[group]]
id = 202
max-posts = 5

[[keyword]]
word = "спам"
"#,
        server_uri,
        db_path.display()
    );
    parse_config(&text).expect("Failed to parse test config")
}

/// Opens storage for `config` and writes its groups and keywords
fn open_synced(config: &Config) -> SharedStorage {
    let shared = storage::open_shared(Path::new(&config.storage.database_path))
        .expect("Failed to open storage");
    {
        let mut guard = storage::lock(&shared).unwrap();
        storage::sync_config(&mut *guard, config).unwrap();
    }
    shared
}

fn ok(response: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "response": response }))
}

fn api_error(code: i64, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_json(json!({ "error": { "error_code": code, "error_msg": message } }))
}

/// Mounts `groups.getById` for one group
async fn mount_group(server: &MockServer, group_id: i64, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/method/groups.getById"))
        .and(body_string_contains(format!("group_id={}&", group_id)))
        .respond_with(response)
        .mount(server)
        .await;
}

/// Mounts `wall.get` for one group
async fn mount_wall(server: &MockServer, group_id: i64, posts: Value) {
    let count = posts.as_array().map(|p| p.len()).unwrap_or(0);
    Mock::given(method("POST"))
        .and(path("/method/wall.get"))
        .and(body_string_contains(format!("owner_id=-{}&", group_id)))
        .respond_with(ok(json!({ "count": count, "items": posts })))
        .mount(server)
        .await;
}

/// Mounts `wall.getComments` for one post
async fn mount_comments(server: &MockServer, post_id: i64, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/method/wall.getComments"))
        .and(body_string_contains(format!("post_id={}&", post_id)))
        .respond_with(response)
        .mount(server)
        .await;
}

fn post(group_id: i64, id: i64, comments: i64) -> Value {
    json!({
        "id": id,
        "owner_id": -group_id,
        "date": 1_700_000_000 + id,
        "text": format!("Пост {}", id),
        "comments": { "count": comments },
    })
}

fn comment(id: i64, text: &str) -> Value {
    json!({ "id": id, "from_id": 500 + id, "date": 1_700_000_100 + id, "text": text })
}

#[tokio::test]
async fn test_full_crawl_single_group() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&mock_server.uri(), &dir.path().join("watch.db"));

    mount_group(&mock_server, 101, ok(json!([{ "id": 101, "name": "Новости района" }]))).await;
    mount_wall(
        &mock_server,
        101,
        json!([post(101, 11, 2), post(101, 10, 1), post(101, 9, 0)]),
    )
    .await;
    mount_comments(
        &mock_server,
        11,
        ok(json!({
            "count": 2,
            "items": [comment(1, "Это спам, не ведитесь"), comment(2, "Спасибо за новость")],
        })),
    )
    .await;
    mount_comments(
        &mock_server,
        10,
        ok(json!({ "count": 1, "items": [comment(3, "Опять СПАМ в ленте")] })),
    )
    .await;

    let shared = open_synced(&config);
    let registry = TaskRegistry::from_config(&config.storage).unwrap();
    let orchestrator = CrawlOrchestrator::from_config(&config, shared.clone(), registry)
        .unwrap()
        .with_config_hash("abc123");

    let handle = orchestrator
        .start(vec![101], CrawlOptions::default())
        .unwrap();
    let task = handle.wait().await.unwrap();

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.config_hash.as_deref(), Some("abc123"));
    assert_eq!(task.stats.posts_processed, 3);
    assert_eq!(task.stats.comments_found, 3);
    assert_eq!(task.stats.new_comments, 3);
    assert_eq!(task.stats.keyword_matches, 2);

    let guard = storage::lock(&shared).unwrap();
    let counts = guard.counts().unwrap();
    assert_eq!(counts.posts, 3);
    assert_eq!(counts.comments, 3);
    assert_eq!(counts.keyword_matches, 2);

    let group = guard.get_group(101).unwrap().unwrap();
    assert_eq!(group.name.as_deref(), Some("Новости района"));
    assert!(group.last_crawled_at.is_some());

    let keywords = guard.list_keywords().unwrap();
    assert_eq!(keywords[0].match_count, 2);
    drop(guard);

    // A second process opening the same database sees the finished task
    let other = TaskRegistry::sqlite(Path::new(&config.storage.database_path)).unwrap();
    let stored = other.get(task.id).unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Completed);
    assert_eq!(stored.stats.new_comments, 3);
}

#[tokio::test]
async fn test_recrawl_only_counts_new_comments() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&mock_server.uri(), &dir.path().join("watch.db"));

    mount_group(&mock_server, 101, ok(json!([{ "id": 101, "name": "Район" }]))).await;
    mount_wall(&mock_server, 101, json!([post(101, 10, 1)])).await;
    mount_comments(
        &mock_server,
        10,
        ok(json!({ "count": 1, "items": [comment(1, "спам")] })),
    )
    .await;

    let shared = open_synced(&config);
    let orchestrator =
        CrawlOrchestrator::from_config(&config, shared.clone(), TaskRegistry::in_memory())
            .unwrap();

    let first = orchestrator
        .start(vec![101], CrawlOptions::default())
        .unwrap()
        .wait()
        .await
        .unwrap();
    let second = orchestrator
        .start(vec![101], CrawlOptions::default())
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(first.stats.new_comments, 1);
    assert_eq!(first.stats.keyword_matches, 1);
    assert_eq!(second.status, TaskStatus::Completed);
    assert_eq!(second.stats.comments_found, 1);
    assert_eq!(second.stats.new_comments, 0);
    assert_eq!(second.stats.keyword_matches, 0);

    let guard = storage::lock(&shared).unwrap();
    assert_eq!(guard.counts().unwrap().comments, 1);
    assert_eq!(guard.list_keywords().unwrap()[0].match_count, 1);
}

#[tokio::test]
async fn test_denied_comments_skip_only_that_post() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&mock_server.uri(), &dir.path().join("watch.db"));

    mount_group(&mock_server, 101, ok(json!([{ "id": 101, "name": "Район" }]))).await;
    mount_wall(&mock_server, 101, json!([post(101, 11, 3), post(101, 10, 1)])).await;
    mount_comments(&mock_server, 11, api_error(15, "Access denied")).await;
    mount_comments(
        &mock_server,
        10,
        ok(json!({ "count": 1, "items": [comment(1, "обычный спам")] })),
    )
    .await;

    let shared = open_synced(&config);
    let orchestrator =
        CrawlOrchestrator::from_config(&config, shared, TaskRegistry::in_memory()).unwrap();

    let task = orchestrator
        .start(vec![101], CrawlOptions::default())
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.stats.posts_processed, 2);
    assert_eq!(task.stats.posts_skipped, 1);
    assert_eq!(task.stats.new_comments, 1);
    assert_eq!(task.stats.keyword_matches, 1);
}

#[tokio::test]
async fn test_bulk_crawl_isolates_unavailable_group() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&mock_server.uri(), &dir.path().join("watch.db"));

    mount_group(&mock_server, 101, ok(json!([{ "id": 101, "name": "Район" }]))).await;
    mount_group(&mock_server, 202, api_error(203, "Access to the group is denied")).await;
    mount_wall(&mock_server, 101, json!([post(101, 10, 0)])).await;

    let shared = open_synced(&config);
    let orchestrator =
        CrawlOrchestrator::from_config(&config, shared, TaskRegistry::in_memory()).unwrap();

    let result = orchestrator.start_bulk(BulkConfig::default()).await.unwrap();

    assert_eq!(result.total_groups, 2);
    assert_eq!(result.started_tasks, 2);
    assert_eq!(result.failed_groups.len(), 1);
    assert_eq!(result.failed_groups[0].group_id, 202);

    let statuses: Vec<_> = result.tasks.iter().map(|t| t.status).collect();
    assert_eq!(statuses, vec![TaskStatus::Completed, TaskStatus::Failed]);
    assert!(result.tasks[1]
        .error_message
        .as_deref()
        .unwrap_or_default()
        .contains("202"));
}

#[tokio::test]
async fn test_http_client_sends_token_and_version() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&mock_server.uri(), &dir.path().join("watch.db"));

    Mock::given(method("POST"))
        .and(path("/method/groups.getById"))
        .and(header("authorization", "Bearer test-token"))
        .and(body_string_contains("group_id=7&v=5."))
        .respond_with(ok(json!([{ "id": 7, "name": "Семь" }])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = HttpApiClient::new(&config.api).unwrap();
    let value = client
        .call("groups.getById", &Params::new().with("group_id", 7))
        .await
        .unwrap();

    assert_eq!(value[0]["name"], "Семь");
}

#[tokio::test]
async fn test_http_client_classifies_errors() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&mock_server.uri(), &dir.path().join("watch.db"));

    Mock::given(method("POST"))
        .and(path("/method/wall.getComments"))
        .respond_with(api_error(15, "Access denied"))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/method/wall.get"))
        .respond_with(api_error(104, "Not found"))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/method/groups.getById"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/method/board.getTopics"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let client = HttpApiClient::new(&config.api).unwrap();
    let params = Params::new();

    assert!(matches!(
        client.call("wall.getComments", &params).await,
        Err(ApiError::AccessDenied { code: 15, .. })
    ));
    assert!(matches!(
        client.call("wall.get", &params).await,
        Err(ApiError::NotFound { code: 104, .. })
    ));
    assert!(matches!(
        client.call("groups.getById", &params).await,
        Err(ApiError::RateLimited { .. })
    ));
    assert!(matches!(
        client.call("board.getTopics", &params).await,
        Err(ApiError::Network(_))
    ));
}

#[tokio::test]
async fn test_rate_limited_client_retries_throttled_call() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&mock_server.uri(), &dir.path().join("watch.db"));

    // First answer is throttled, the retry succeeds
    Mock::given(method("POST"))
        .and(path("/method/wall.get"))
        .respond_with(api_error(6, "Too many requests per second"))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/method/wall.get"))
        .respond_with(ok(json!({ "count": 0, "items": [] })))
        .mount(&mock_server)
        .await;

    let client = RateLimitedClient::from_config(HttpApiClient::new(&config.api).unwrap(), &config.api);
    let value = client.call("wall.get", &Params::new()).await.unwrap();

    assert_eq!(value["count"], 0);
    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
}

#[tokio::test]
async fn test_missing_token_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config("http://127.0.0.1:9", &dir.path().join("watch.db"));
    config.api.access_token = String::new();

    let shared = storage::open_shared(Path::new(&config.storage.database_path)).unwrap();
    let result = CrawlOrchestrator::from_config(&config, shared, TaskRegistry::in_memory());

    assert!(result.is_err());
}
