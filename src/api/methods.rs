//! Typed wrappers for the upstream methods used by the crawler

use crate::api::error::{ApiError, ApiResult};
use crate::api::types::{ExternalComment, ExternalPost, GroupInfo, GroupsResponse, Page};
use crate::api::{ApiClient, Params};

/// Wall owner id for a community (communities are addressed with a negative id)
pub fn owner_id(group_id: i64) -> i64 {
    -group_id.abs()
}

/// Fetches a community's description via `groups.getById`
pub async fn get_group(client: &dyn ApiClient, group_id: i64) -> ApiResult<GroupInfo> {
    let params = Params::new().with("group_id", group_id.abs());
    let value = client.call("groups.getById", &params).await?;
    let groups: GroupsResponse = serde_json::from_value(value)?;

    groups
        .into_groups()
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::NotFound {
            code: 0,
            message: format!("group {} not returned", group_id),
        })
}

/// Fetches one page of wall posts via `wall.get`
pub async fn get_wall_page(
    client: &dyn ApiClient,
    group_id: i64,
    offset: u32,
    count: u32,
) -> ApiResult<Page<ExternalPost>> {
    let params = Params::new()
        .with("owner_id", owner_id(group_id))
        .with("offset", offset)
        .with("count", count)
        .with("filter", "all");
    let value = client.call("wall.get", &params).await?;
    Ok(serde_json::from_value(value)?)
}

/// Fetches one page of a post's comments via `wall.getComments`, oldest first
pub async fn get_comments_page(
    client: &dyn ApiClient,
    group_id: i64,
    post_id: i64,
    offset: u32,
    count: u32,
) -> ApiResult<Page<ExternalComment>> {
    let params = Params::new()
        .with("owner_id", owner_id(group_id))
        .with("post_id", post_id)
        .with("offset", offset)
        .with("count", count)
        .with("sort", "asc");
    let value = client.call("wall.getComments", &params).await?;
    Ok(serde_json::from_value(value)?)
}
