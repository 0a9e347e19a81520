//! Wire types for the upstream API

use crate::api::error::{ApiError, ApiResult};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;

/// Response envelope: `{"response": ...}` on success, `{"error": {...}}` on failure
#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub response: Option<Value>,
    #[serde(default)]
    pub error: Option<ErrorBody>,
}

/// Error payload carried inside the envelope
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub error_code: i64,
    #[serde(default)]
    pub error_msg: String,
}

impl Envelope {
    /// Converts the envelope into the response value or a classified error
    pub fn into_result(self) -> ApiResult<Value> {
        if let Some(error) = self.error {
            return Err(ApiError::from_code(error.error_code, error.error_msg));
        }
        self.response
            .ok_or_else(|| ApiError::Decode("envelope has neither response nor error".to_string()))
    }
}

/// A `{"count": n}` counter object
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Counter {
    #[serde(default)]
    pub count: i64,
}

/// A wall post as returned by `wall.get`
#[derive(Debug, Clone, Deserialize)]
pub struct ExternalPost {
    pub id: i64,
    pub owner_id: i64,
    #[serde(default)]
    pub from_id: Option<i64>,
    #[serde(default)]
    pub date: i64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub comments: Option<Counter>,
    #[serde(default)]
    pub likes: Option<Counter>,
    #[serde(default)]
    pub reposts: Option<Counter>,
    #[serde(default)]
    pub views: Option<Counter>,
}

impl ExternalPost {
    pub fn comment_count(&self) -> i64 {
        self.comments.as_ref().map(|c| c.count).unwrap_or(0)
    }

    pub fn published_at(&self) -> DateTime<Utc> {
        from_unix(self.date)
    }
}

/// A wall comment as returned by `wall.getComments`
#[derive(Debug, Clone, Deserialize)]
pub struct ExternalComment {
    pub id: i64,
    #[serde(default)]
    pub from_id: i64,
    #[serde(default)]
    pub date: i64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub deleted: Option<bool>,
}

impl ExternalComment {
    pub fn published_at(&self) -> DateTime<Utc> {
        from_unix(self.date)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.unwrap_or(false)
    }
}

/// One page of a paginated listing
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub count: i64,
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

/// Community description from `groups.getById`
#[derive(Debug, Clone, Deserialize)]
pub struct GroupInfo {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub screen_name: String,
    #[serde(default)]
    pub is_closed: i64,
    #[serde(default)]
    pub deactivated: Option<String>,
}

/// `groups.getById` returns a bare list in older API versions and `{groups: [...]}` in newer ones
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum GroupsResponse {
    List(Vec<GroupInfo>),
    Wrapped { groups: Vec<GroupInfo> },
}

impl GroupsResponse {
    pub(crate) fn into_groups(self) -> Vec<GroupInfo> {
        match self {
            Self::List(groups) => groups,
            Self::Wrapped { groups } => groups,
        }
    }
}

fn from_unix(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0).single().unwrap_or_default()
}
