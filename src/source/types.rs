use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque account identifier (e.g. `alice.near`).
pub type AccountId = String;

/// A post as the engine sees it, with engagement flattened to account lists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Post {
    pub id: i64,
    pub account_id: AccountId,
    /// Block time of the post; `None` when the indexer returned no usable timestamp.
    pub timestamp: Option<DateTime<Utc>>,
    pub content: String,
    pub commenter_ids: Vec<AccountId>,
    pub liker_ids: Vec<AccountId>,
}

impl Post {
    pub fn new(id: i64, account_id: &str) -> Self {
        Self {
            id,
            account_id: account_id.to_string(),
            timestamp: None,
            content: String::new(),
            commenter_ids: Vec::new(),
            liker_ids: Vec::new(),
        }
    }

    pub fn liked_by(mut self, accounts: &[&str]) -> Self {
        self.liker_ids.extend(accounts.iter().map(|a| a.to_string()));
        self
    }

    pub fn commented_by(mut self, accounts: &[&str]) -> Self {
        self.commenter_ids.extend(accounts.iter().map(|a| a.to_string()));
        self
    }
}

// ── Feed indexer (Hasura GraphQL) ────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct GraphqlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
pub struct GraphqlError {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct FeedPostsData {
    pub dataplatform_near_social_feed_posts: Vec<FeedPostRecord>,
}

#[derive(Debug, Deserialize)]
pub struct FeedPostRecord {
    pub id: i64,
    pub account_id: String,
    #[serde(default)]
    pub block_timestamp: serde_json::Value,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub comments: Vec<EngagementRecord>,
    #[serde(default)]
    pub post_likes: Vec<EngagementRecord>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct EngagementRecord {
    pub account_id: String,
    #[serde(default)]
    pub block_height: serde_json::Value,
}

/// Block timestamps are nanoseconds since the epoch, sent either as a JSON
/// number or as a numeric string depending on the Hasura column type.
pub fn parse_block_timestamp(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    let nanos: i64 = match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().and_then(|v| i64::try_from(v).ok()))
            .or_else(|| n.as_f64().map(|v| v as i64))?,
        serde_json::Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|v| v as i64))?
        }
        _ => return None,
    };
    if nanos <= 0 {
        return None;
    }
    Some(DateTime::from_timestamp_nanos(nanos))
}

impl From<FeedPostRecord> for Post {
    fn from(record: FeedPostRecord) -> Self {
        Self {
            id: record.id,
            timestamp: parse_block_timestamp(&record.block_timestamp),
            account_id: record.account_id,
            content: record.content.unwrap_or_default(),
            commenter_ids: record.comments.into_iter().map(|c| c.account_id).collect(),
            liker_ids: record.post_likes.into_iter().map(|l| l.account_id).collect(),
        }
    }
}

// ── Social index (follow graph) ──────────────────────────────────────

/// One edge record from the social index `graph` action.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(dead_code)]
pub struct GraphIndexEntry {
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub block_height: Option<u64>,
    pub value: GraphIndexValue,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphIndexValue {
    pub account_id: String,
    #[serde(default, rename = "type")]
    #[allow(dead_code)]
    pub kind: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_record_flattens_engagement() {
        let json = r#"{
            "id": 7,
            "account_id": "alice.near",
            "block_timestamp": 1700000000000000000,
            "content": "{\"text\":\"hi\"}",
            "comments": [{ "account_id": "bob.near", "block_height": 101 }],
            "post_likes": [
                { "account_id": "carol.near", "block_height": 102 },
                { "account_id": "bob.near", "block_height": 103 }
            ]
        }"#;
        let record: FeedPostRecord = serde_json::from_str(json).unwrap();
        let post = Post::from(record);
        assert_eq!(post.id, 7);
        assert_eq!(post.account_id, "alice.near");
        assert_eq!(post.commenter_ids, vec!["bob.near"]);
        assert_eq!(post.liker_ids, vec!["carol.near", "bob.near"]);
        assert_eq!(post.timestamp.unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_feed_record_missing_engagement_lists() {
        let json = r#"{ "id": 1, "account_id": "a.near", "block_timestamp": null }"#;
        let post = Post::from(serde_json::from_str::<FeedPostRecord>(json).unwrap());
        assert!(post.commenter_ids.is_empty());
        assert!(post.liker_ids.is_empty());
        assert!(post.timestamp.is_none());
        assert_eq!(post.content, "");
    }

    #[test]
    fn test_block_timestamp_as_string() {
        let value = serde_json::json!("1700000000000000000");
        assert_eq!(parse_block_timestamp(&value).unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_block_timestamp_garbage() {
        assert!(parse_block_timestamp(&serde_json::json!("soon")).is_none());
        assert!(parse_block_timestamp(&serde_json::json!({ "x": 1 })).is_none());
        assert!(parse_block_timestamp(&serde_json::json!(0)).is_none());
    }

    #[test]
    fn test_graph_index_entry_parses() {
        let json = r#"[{
            "accountId": "alice.near",
            "blockHeight": 99,
            "value": { "type": "follow", "accountId": "bob.near" }
        }]"#;
        let entries: Vec<GraphIndexEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(entries[0].value.account_id, "bob.near");
    }
}
