//! In-memory graph and post sources. Used for offline runs and tests; every
//! fetch is recorded so callers can assert on traversal behaviour.

use super::types::{AccountId, Post};
use super::{GraphSource, PostSource};
use crate::error::{GraphFetchError, PostFetchError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Default)]
pub struct InMemoryGraph {
    edges: HashMap<AccountId, Vec<AccountId>>,
    failing: HashSet<AccountId>,
    fetches: Mutex<Vec<AccountId>>,
}

impl InMemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(account, followings)` pairs.
    pub fn from_edges(edges: &[(&str, &[&str])]) -> Self {
        let mut graph = Self::new();
        for (account, followings) in edges {
            graph.set_followings(account, followings);
        }
        graph
    }

    pub fn set_followings(&mut self, account: &str, followings: &[&str]) {
        self.edges.insert(
            account.to_string(),
            followings.iter().map(|f| f.to_string()).collect(),
        );
    }

    /// Make every fetch for `account` fail.
    pub fn fail_on(mut self, account: &str) -> Self {
        self.failing.insert(account.to_string());
        self
    }

    /// Accounts fetched so far, in call order.
    pub fn fetch_log(&self) -> Vec<AccountId> {
        self.fetches.lock().map(|f| f.clone()).unwrap_or_default()
    }

    pub fn fetch_count(&self, account: &str) -> usize {
        self.fetch_log().iter().filter(|a| *a == account).count()
    }
}

#[async_trait]
impl GraphSource for InMemoryGraph {
    async fn fetch_followings(&self, account: &str) -> Result<Vec<AccountId>, GraphFetchError> {
        if let Ok(mut fetches) = self.fetches.lock() {
            fetches.push(account.to_string());
        }
        if self.failing.contains(account) {
            return Err(GraphFetchError::Status {
                account: account.to_string(),
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(self.edges.get(account).cloned().unwrap_or_default())
    }
}

/// Posts are kept in insertion order, which stands in for newest-first.
#[derive(Default)]
pub struct InMemoryPosts {
    posts: Vec<Post>,
    failing: HashSet<AccountId>,
    fetches: Mutex<Vec<AccountId>>,
}

impl InMemoryPosts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_posts(posts: Vec<Post>) -> Self {
        Self {
            posts,
            ..Self::default()
        }
    }

    pub fn push(&mut self, post: Post) {
        self.posts.push(post);
    }

    pub fn fail_on(mut self, account: &str) -> Self {
        self.failing.insert(account.to_string());
        self
    }

    pub fn fetch_log(&self) -> Vec<AccountId> {
        self.fetches.lock().map(|f| f.clone()).unwrap_or_default()
    }

    pub fn fetch_count(&self, account: &str) -> usize {
        self.fetch_log().iter().filter(|a| *a == account).count()
    }
}

fn page(posts: impl Iterator<Item = Post>, limit: u32, offset: u32) -> Vec<Post> {
    posts.skip(offset as usize).take(limit as usize).collect()
}

#[async_trait]
impl PostSource for InMemoryPosts {
    async fn fetch_posts(
        &self,
        account: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Post>, PostFetchError> {
        if let Ok(mut fetches) = self.fetches.lock() {
            fetches.push(account.to_string());
        }
        if self.failing.contains(account) {
            return Err(PostFetchError::Status {
                scope: account.to_string(),
                status: 500,
                body: "indexer error".to_string(),
            });
        }
        let own = self.posts.iter().filter(|p| p.account_id == account).cloned();
        Ok(page(own, limit, offset))
    }

    async fn fetch_recent(&self, limit: u32, offset: u32) -> Result<Vec<Post>, PostFetchError> {
        Ok(page(self.posts.iter().cloned(), limit, offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_account_follows_nobody() {
        let graph = InMemoryGraph::from_edges(&[("a", &["b"])]);
        assert!(graph.fetch_followings("zzz").await.unwrap().is_empty());
        assert_eq!(graph.fetch_log(), vec!["zzz"]);
    }

    #[tokio::test]
    async fn test_failing_account_errors() {
        let graph = InMemoryGraph::from_edges(&[("a", &["b"])]).fail_on("a");
        assert!(graph.fetch_followings("a").await.is_err());
    }

    #[tokio::test]
    async fn test_posts_paging() {
        let posts = InMemoryPosts::from_posts(vec![
            Post::new(3, "a"),
            Post::new(2, "b"),
            Post::new(1, "a"),
            Post::new(0, "a"),
        ]);
        let page1 = posts.fetch_posts("a", 2, 0).await.unwrap();
        assert_eq!(page1.iter().map(|p| p.id).collect::<Vec<_>>(), vec![3, 1]);
        let page2 = posts.fetch_posts("a", 2, 2).await.unwrap();
        assert_eq!(page2.iter().map(|p| p.id).collect::<Vec<_>>(), vec![0]);
        assert_eq!(posts.fetch_recent(10, 1).await.unwrap().len(), 3);
    }
}
