pub mod feed_indexer;
pub mod memory;
pub mod social_index;
pub mod types;

use crate::error::{GraphFetchError, PostFetchError};
use async_trait::async_trait;
use types::{AccountId, Post};

/// Read side of the follow graph.
#[async_trait]
pub trait GraphSource: Send + Sync {
    /// Accounts that `account` follows, in index order. An account that follows
    /// nobody yields an empty list, not an error.
    async fn fetch_followings(&self, account: &str) -> Result<Vec<AccountId>, GraphFetchError>;
}

/// Read side of the post index.
#[async_trait]
pub trait PostSource: Send + Sync {
    /// One page of `account`'s most recent posts.
    async fn fetch_posts(
        &self,
        account: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Post>, PostFetchError>;

    /// One page of the most recent posts across all accounts.
    async fn fetch_recent(&self, limit: u32, offset: u32) -> Result<Vec<Post>, PostFetchError>;
}
