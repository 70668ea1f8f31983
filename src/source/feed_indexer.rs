use super::types::*;
use super::PostSource;
use crate::config::PostsConfig;
use crate::error::PostFetchError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

const POST_FIELDS: &str = "
        id
        account_id
        block_timestamp
        content
        comments {
            account_id
            block_height
        }
        post_likes {
            account_id
            block_height
        }";

/// Newest-first posts of a single account.
pub fn feed_by_account_query() -> String {
    format!(
        "query GetFeedByAccountId($accountId: String!, $limit: Int!, $offset: Int!) {{
    dataplatform_near_social_feed_posts(
        order_by: {{ block_height: desc }}, limit: $limit, offset: $offset,
        where: {{ account_id: {{ _eq: $accountId }} }}
    ) {{{}
    }}
}}",
        POST_FIELDS
    )
}

/// Newest-first posts across all accounts.
pub fn all_posts_query() -> String {
    format!(
        "query GetAllPostQuery($limit: Int!, $offset: Int!) {{
    dataplatform_near_social_feed_posts(
        order_by: {{ block_height: desc }}, limit: $limit, offset: $offset
    ) {{{}
    }}
}}",
        POST_FIELDS
    )
}

/// Decode a GraphQL response body into posts. `scope` names the request in errors.
pub fn parse_feed_response(scope: &str, body: &str) -> Result<Vec<Post>, PostFetchError> {
    let malformed = |message: String| PostFetchError::Malformed {
        scope: scope.to_string(),
        message,
    };

    let resp: GraphqlResponse<FeedPostsData> =
        serde_json::from_str(body).map_err(|e| malformed(e.to_string()))?;

    if !resp.errors.is_empty() {
        let messages: Vec<&str> = resp.errors.iter().map(|e| e.message.as_str()).collect();
        return Err(malformed(messages.join("; ")));
    }

    let data = resp.data.ok_or_else(|| malformed("response has no data".to_string()))?;
    Ok(data
        .dataplatform_near_social_feed_posts
        .into_iter()
        .map(Post::from)
        .collect())
}

/// Post client for the Hasura feed indexer.
pub struct FeedIndexer {
    client: Client,
    graphql_url: String,
    hasura_role: String,
    timeout_ms: u64,
}

impl FeedIndexer {
    pub fn new(config: &PostsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .context("failed to build feed indexer HTTP client")?;
        Ok(Self {
            client,
            graphql_url: config.graphql_url.clone(),
            hasura_role: config.hasura_role.clone(),
            timeout_ms: config.request_timeout_ms,
        })
    }

    async fn run_query(
        &self,
        scope: &str,
        operation_name: &str,
        query: String,
        variables: serde_json::Value,
    ) -> Result<Vec<Post>, PostFetchError> {
        let network = |e: reqwest::Error| {
            if e.is_timeout() {
                PostFetchError::Timeout {
                    scope: scope.to_string(),
                    after_ms: self.timeout_ms,
                }
            } else {
                PostFetchError::Network {
                    scope: scope.to_string(),
                    message: e.to_string(),
                }
            }
        };

        let resp = self
            .client
            .post(&self.graphql_url)
            .header("x-hasura-role", &self.hasura_role)
            .json(&json!({
                "query": query,
                "variables": variables,
                "operationName": operation_name,
            }))
            .send()
            .await
            .map_err(network)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PostFetchError::Status {
                scope: scope.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.text().await.map_err(network)?;
        parse_feed_response(scope, &body)
    }
}

#[async_trait]
impl PostSource for FeedIndexer {
    async fn fetch_posts(
        &self,
        account: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Post>, PostFetchError> {
        let posts = self
            .run_query(
                account,
                "GetFeedByAccountId",
                feed_by_account_query(),
                json!({ "accountId": account, "limit": limit, "offset": offset }),
            )
            .await?;
        tracing::debug!(account, limit, offset, count = posts.len(), "fetched account posts");
        Ok(posts)
    }

    async fn fetch_recent(&self, limit: u32, offset: u32) -> Result<Vec<Post>, PostFetchError> {
        let posts = self
            .run_query(
                "all accounts",
                "GetAllPostQuery",
                all_posts_query(),
                json!({ "limit": limit, "offset": offset }),
            )
            .await?;
        tracing::debug!(limit, offset, count = posts.len(), "fetched recent posts");
        Ok(posts)
    }
}
