//! Recursive post collection across the follow graph.
//!
//! Unlike the crawler, collection keeps no visited set: an account reachable
//! through several paths (a diamond, or a cycle within the depth bound) has its
//! posts fetched and appended once per path. Downstream features are computed
//! per collected post, so repeated posts weigh more in the dataset.

use crate::error::PostFetchError;
use crate::source::types::Post;
use crate::source::{GraphSource, PostSource};
use futures_util::future::{BoxFuture, FutureExt};
use std::sync::Arc;

/// Page requested from every account, at every depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub limit: u32,
    pub offset: u32,
}

pub struct PostCollector {
    graph: Arc<dyn GraphSource>,
    posts: Arc<dyn PostSource>,
    skip_failed_branches: bool,
}

impl PostCollector {
    pub fn new(
        graph: Arc<dyn GraphSource>,
        posts: Arc<dyn PostSource>,
        skip_failed_branches: bool,
    ) -> Self {
        Self {
            graph,
            posts,
            skip_failed_branches,
        }
    }

    /// Posts of `root` followed by the posts of each following's subtree, in
    /// follow-list order. A failure fetching the root's own posts is returned;
    /// a failing follower branch is logged and dropped when
    /// `skip_failed_branches` is set, and returned otherwise.
    pub async fn collect_posts(
        &self,
        root: &str,
        max_depth: u32,
        window: PageWindow,
    ) -> Result<Vec<Post>, PostFetchError> {
        let posts = self.collect_branch(root, max_depth, window).await?;
        tracing::info!(root, max_depth, posts = posts.len(), "post collection complete");
        Ok(posts)
    }

    fn collect_branch<'a>(
        &'a self,
        account: &'a str,
        depth: u32,
        window: PageWindow,
    ) -> BoxFuture<'a, Result<Vec<Post>, PostFetchError>> {
        async move {
            if depth == 0 {
                return Ok(Vec::new());
            }

            let mut posts = self
                .posts
                .fetch_posts(account, window.limit, window.offset)
                .await?;

            let followings = match self.graph.fetch_followings(account).await {
                Ok(f) => f,
                Err(e) => {
                    tracing::warn!(
                        account,
                        error = %e,
                        "follow list unavailable, collecting own posts only"
                    );
                    Vec::new()
                }
            };

            for following in &followings {
                match self.collect_branch(following, depth - 1, window).await {
                    Ok(branch) => posts.extend(branch),
                    Err(e) if self.skip_failed_branches => {
                        tracing::warn!(account = %following, error = %e, "dropping post branch");
                    }
                    Err(e) => return Err(e),
                }
            }

            Ok(posts)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::memory::{InMemoryGraph, InMemoryPosts};

    const WINDOW: PageWindow = PageWindow { limit: 10, offset: 0 };

    fn ids(posts: &[Post]) -> Vec<i64> {
        posts.iter().map(|p| p.id).collect()
    }

    fn collector(graph: InMemoryGraph, posts: InMemoryPosts, skip: bool) -> PostCollector {
        PostCollector::new(Arc::new(graph), Arc::new(posts), skip)
    }

    #[tokio::test]
    async fn test_zero_depth_is_empty() {
        let posts = Arc::new(InMemoryPosts::from_posts(vec![Post::new(1, "a")]));
        let c = PostCollector::new(Arc::new(InMemoryGraph::new()), posts.clone(), true);
        assert!(c.collect_posts("a", 0, WINDOW).await.unwrap().is_empty());
        assert!(posts.fetch_log().is_empty());
    }

    #[tokio::test]
    async fn test_root_first_then_followings_in_order() {
        let graph = InMemoryGraph::from_edges(&[("a", &["c", "b"])]);
        let posts = InMemoryPosts::from_posts(vec![
            Post::new(1, "a"),
            Post::new(2, "b"),
            Post::new(3, "c"),
            Post::new(4, "a"),
        ]);
        let out = collector(graph, posts, true)
            .collect_posts("a", 2, WINDOW)
            .await
            .unwrap();
        assert_eq!(ids(&out), vec![1, 4, 3, 2]);
    }

    #[tokio::test]
    async fn test_same_window_at_every_depth() {
        let graph = InMemoryGraph::from_edges(&[("a", &["b"])]);
        let posts = InMemoryPosts::from_posts(vec![
            Post::new(1, "a"),
            Post::new(2, "a"),
            Post::new(3, "b"),
            Post::new(4, "b"),
            Post::new(5, "b"),
        ]);
        let window = PageWindow { limit: 1, offset: 1 };
        let out = collector(graph, posts, true)
            .collect_posts("a", 2, window)
            .await
            .unwrap();
        assert_eq!(ids(&out), vec![2, 4]);
    }

    #[tokio::test]
    async fn test_diamond_duplicates_posts() {
        // a -> b, c; b -> d; c -> d. d is reached twice, so its posts appear twice.
        let graph = InMemoryGraph::from_edges(&[("a", &["b", "c"]), ("b", &["d"]), ("c", &["d"])]);
        let posts = Arc::new(InMemoryPosts::from_posts(vec![Post::new(9, "d")]));
        let c = PostCollector::new(Arc::new(graph), posts.clone(), true);
        let out = c.collect_posts("a", 3, WINDOW).await.unwrap();
        assert_eq!(ids(&out), vec![9, 9]);
        assert_eq!(posts.fetch_count("d"), 2);
    }

    #[tokio::test]
    async fn test_cycle_bounded_by_depth() {
        let graph = InMemoryGraph::from_edges(&[("a", &["b"]), ("b", &["a"])]);
        let posts = InMemoryPosts::from_posts(vec![Post::new(1, "a"), Post::new(2, "b")]);
        let out = collector(graph, posts, true)
            .collect_posts("a", 3, WINDOW)
            .await
            .unwrap();
        assert_eq!(ids(&out), vec![1, 2, 1]);
    }

    #[tokio::test]
    async fn test_root_post_failure_propagates() {
        let graph = InMemoryGraph::from_edges(&[("a", &["b"])]);
        let posts = InMemoryPosts::from_posts(vec![Post::new(1, "b")]).fail_on("a");
        let err = collector(graph, posts, true)
            .collect_posts("a", 2, WINDOW)
            .await
            .unwrap_err();
        assert!(matches!(err, PostFetchError::Status { .. }));
    }

    #[tokio::test]
    async fn test_failed_branch_skipped() {
        let graph = InMemoryGraph::from_edges(&[("a", &["b", "c"])]);
        let posts = InMemoryPosts::from_posts(vec![
            Post::new(1, "a"),
            Post::new(2, "b"),
            Post::new(3, "c"),
        ])
        .fail_on("b");
        let out = collector(graph, posts, true)
            .collect_posts("a", 2, WINDOW)
            .await
            .unwrap();
        assert_eq!(ids(&out), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_failed_branch_aborts_when_not_skipping() {
        let graph = InMemoryGraph::from_edges(&[("a", &["b", "c"])]);
        let posts = InMemoryPosts::from_posts(vec![Post::new(1, "a")]).fail_on("b");
        let result = collector(graph, posts, false)
            .collect_posts("a", 2, WINDOW)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_graph_failure_keeps_own_posts() {
        let graph = InMemoryGraph::from_edges(&[("a", &["b"])]).fail_on("a");
        let posts = InMemoryPosts::from_posts(vec![Post::new(1, "a"), Post::new(2, "b")]);
        let out = collector(graph, posts, false)
            .collect_posts("a", 2, WINDOW)
            .await
            .unwrap();
        assert_eq!(ids(&out), vec![1]);
    }
}
