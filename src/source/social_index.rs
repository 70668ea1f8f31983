use super::types::*;
use super::GraphSource;
use crate::config::GraphConfig;
use crate::error::GraphFetchError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

/// Follow-graph client for the social `index` endpoint.
pub struct SocialIndexGraph {
    client: Client,
    index_url: String,
    timeout_ms: u64,
}

/// Request body for the `graph`/`follow` index action.
fn follow_query(account: &str) -> serde_json::Value {
    json!({
        "action": "graph",
        "key": "follow",
        "options": {
            "order": "desc",
            "accountId": account,
        },
    })
}

/// Extract followed account ids from an index response body, preserving order.
pub fn parse_followings(account: &str, body: &str) -> Result<Vec<AccountId>, GraphFetchError> {
    let entries: Vec<GraphIndexEntry> =
        serde_json::from_str(body).map_err(|e| GraphFetchError::Malformed {
            account: account.to_string(),
            message: e.to_string(),
        })?;
    Ok(entries.into_iter().map(|e| e.value.account_id).collect())
}

impl SocialIndexGraph {
    pub fn new(config: &GraphConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .context("failed to build social index HTTP client")?;
        Ok(Self {
            client,
            index_url: config.index_url.clone(),
            timeout_ms: config.request_timeout_ms,
        })
    }

    fn network_error(&self, account: &str, err: reqwest::Error) -> GraphFetchError {
        if err.is_timeout() {
            GraphFetchError::Timeout {
                account: account.to_string(),
                after_ms: self.timeout_ms,
            }
        } else {
            GraphFetchError::Network {
                account: account.to_string(),
                message: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl GraphSource for SocialIndexGraph {
    async fn fetch_followings(&self, account: &str) -> Result<Vec<AccountId>, GraphFetchError> {
        let resp = self
            .client
            .post(&self.index_url)
            .json(&follow_query(account))
            .send()
            .await
            .map_err(|e| self.network_error(account, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GraphFetchError::Status {
                account: account.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.text().await.map_err(|e| self.network_error(account, e))?;
        let followings = parse_followings(account, &body)?;
        tracing::debug!(account, count = followings.len(), "fetched followings");
        Ok(followings)
    }
}
