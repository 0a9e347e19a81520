//! In-process upstream double for crawler tests

use crate::api::{ApiClient, ApiError, ApiResult, Params};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct Wall {
    /// Newest first, as the wall is listed upstream
    posts: Vec<Value>,
    comments: HashMap<i64, Vec<Value>>,
    denied_posts: HashSet<i64>,
    unavailable: bool,
}

/// Serves walls and comments from memory and tracks concurrent calls
#[derive(Default)]
pub struct FakeApi {
    walls: Mutex<HashMap<i64, Wall>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
    /// Group ids in the order their crawls began
    group_order: Mutex<Vec<i64>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps this long before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Adds a post with the given comments (`(id, text)`, oldest first)
    pub fn post(self, group_id: i64, post_id: i64, comments: &[(i64, &str)]) -> Self {
        self.add_post(group_id, post_id, comments);
        self
    }

    /// Adds a group with an empty wall
    pub fn group(self, group_id: i64) -> Self {
        self.walls.lock().unwrap().entry(group_id).or_default();
        self
    }

    /// Marks a group as closed to the crawler
    pub fn unavailable(self, group_id: i64) -> Self {
        self.walls
            .lock()
            .unwrap()
            .entry(group_id)
            .or_default()
            .unavailable = true;
        self
    }

    /// Answers access denied for a post's comments
    pub fn deny_comments(self, group_id: i64, post_id: i64) -> Self {
        self.walls
            .lock()
            .unwrap()
            .entry(group_id)
            .or_default()
            .denied_posts
            .insert(post_id);
        self
    }

    pub fn add_post(&self, group_id: i64, post_id: i64, comments: &[(i64, &str)]) {
        let mut walls = self.walls.lock().unwrap();
        let wall = walls.entry(group_id).or_default();
        wall.posts.insert(
            0,
            json!({
                "id": post_id,
                "owner_id": -group_id,
                "from_id": -group_id,
                "date": 1_700_000_000 + post_id,
                "text": format!("post {}", post_id),
                "comments": {"count": comments.len()},
            }),
        );
        wall.comments.insert(post_id, Vec::new());
        drop(walls);
        for (id, text) in comments {
            self.add_comment(group_id, post_id, *id, text);
        }
    }

    pub fn add_comment(&self, group_id: i64, post_id: i64, comment_id: i64, text: &str) {
        let mut walls = self.walls.lock().unwrap();
        let wall = walls.entry(group_id).or_default();
        wall.comments.entry(post_id).or_default().push(json!({
            "id": comment_id,
            "from_id": 1000 + comment_id,
            "date": 1_700_000_100 + comment_id,
            "text": text,
        }));
        let count = wall.comments[&post_id].len();
        if let Some(post) = wall.posts.iter_mut().find(|p| p["id"] == post_id) {
            post["comments"] = json!({ "count": count });
        }
    }

    pub fn add_deleted_comment(&self, group_id: i64, post_id: i64, comment_id: i64) {
        self.add_comment(group_id, post_id, comment_id, "");
        let mut walls = self.walls.lock().unwrap();
        if let Some(comment) = walls
            .get_mut(&group_id)
            .and_then(|w| w.comments.get_mut(&post_id))
            .and_then(|c| c.iter_mut().find(|c| c["id"] == comment_id))
        {
            comment["deleted"] = json!(true);
        }
    }

    /// Highest number of calls observed in flight at once
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Groups looked up, in call order
    pub fn group_order(&self) -> Vec<i64> {
        self.group_order.lock().unwrap().clone()
    }

    fn answer(&self, method: &str, params: &Params) -> ApiResult<Value> {
        let number = |key: &str| -> i64 {
            params
                .get(key)
                .and_then(|v| v.parse().ok())
                .unwrap_or_default()
        };
        let walls = self.walls.lock().unwrap();

        match method {
            "groups.getById" => {
                let id = number("group_id");
                self.group_order.lock().unwrap().push(id);
                match walls.get(&id) {
                    Some(wall) if !wall.unavailable => {
                        Ok(json!([{ "id": id, "name": format!("Group {}", id) }]))
                    }
                    _ => Err(ApiError::from_code(203, "Access to group denied")),
                }
            }
            "wall.get" | "wall.getComments" => {
                let group_id = -number("owner_id");
                let wall = walls
                    .get(&group_id)
                    .ok_or_else(|| ApiError::from_code(100, "owner not found"))?;
                let offset = number("offset") as usize;
                let count = number("count") as usize;

                let items: &[Value] = if method == "wall.get" {
                    &wall.posts
                } else {
                    let post_id = number("post_id");
                    if wall.denied_posts.contains(&post_id) {
                        return Err(ApiError::from_code(15, "Access denied"));
                    }
                    wall.comments
                        .get(&post_id)
                        .map(|c| c.as_slice())
                        .unwrap_or(&[])
                };

                let page: Vec<Value> = items.iter().skip(offset).take(count).cloned().collect();
                Ok(json!({ "count": items.len(), "items": page }))
            }
            other => Err(ApiError::from_code(5, format!("unknown method {}", other))),
        }
    }
}

#[async_trait]
impl ApiClient for FakeApi {
    async fn call(&self, method: &str, params: &Params) -> ApiResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let result = self.answer(method, params);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
