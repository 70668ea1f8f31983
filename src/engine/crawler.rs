//! Depth-limited, deduplicated traversal of the follow graph.

use crate::source::types::AccountId;
use crate::source::GraphSource;
use futures_util::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;

/// Accounts reachable from a root within a depth bound, in discovery order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Neighborhood {
    accounts: Vec<AccountId>,
    members: HashSet<AccountId>,
    /// Accounts whose follow list could not be fetched (treated as following nobody).
    pub unreachable: Vec<AccountId>,
}

impl Neighborhood {
    fn insert(&mut self, account: &str) -> bool {
        if self.members.contains(account) {
            return false;
        }
        self.members.insert(account.to_string());
        self.accounts.push(account.to_string());
        true
    }

    pub fn contains(&self, account: &str) -> bool {
        self.members.contains(account)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn accounts(&self) -> &[AccountId] {
        &self.accounts
    }
}

pub struct Crawler {
    graph: Arc<dyn GraphSource>,
    concurrency: usize,
}

impl Crawler {
    pub fn new(graph: Arc<dyn GraphSource>, concurrency: usize) -> Self {
        Self {
            graph,
            concurrency: concurrency.max(1),
        }
    }

    /// Neighborhood of `root` up to `max_depth` hops, excluding the root.
    pub async fn crawl_followers(&self, root: &str, max_depth: u32) -> Neighborhood {
        self.crawl(root, max_depth, &mut HashSet::new(), &HashSet::new())
            .await
    }

    /// Level-synchronous crawl against a caller-owned visited set.
    ///
    /// Every account in a level is fetched (at most `concurrency` at a time) and
    /// the whole level joins before the next one starts, so each account is
    /// first reached through a shortest path and the result order depends only
    /// on the graph. Accounts in `known` are traversed but left out of the result.
    pub async fn crawl(
        &self,
        root: &str,
        max_depth: u32,
        visited: &mut HashSet<AccountId>,
        known: &HashSet<AccountId>,
    ) -> Neighborhood {
        let mut hood = Neighborhood::default();
        if max_depth == 0 || visited.contains(root) {
            return hood;
        }

        visited.insert(root.to_string());
        let mut frontier = vec![root.to_string()];
        let mut remaining = max_depth;

        while remaining > 0 && !frontier.is_empty() {
            let graph = &self.graph;
            let level: Vec<_> = stream::iter(frontier)
                .map(|account| async move {
                    let result = graph.fetch_followings(&account).await;
                    (account, result)
                })
                .buffered(self.concurrency)
                .collect()
                .await;

            remaining -= 1;
            let mut next = Vec::new();

            for (account, result) in level {
                let followings = match result {
                    Ok(f) => f,
                    Err(e) => {
                        tracing::warn!(
                            account = %account,
                            error = %e,
                            "follow list unavailable, treating as empty"
                        );
                        hood.unreachable.push(account);
                        continue;
                    }
                };

                for following in followings {
                    if visited.contains(&following) {
                        continue;
                    }
                    if !known.contains(&following) {
                        hood.insert(&following);
                    }
                    if remaining > 0 {
                        visited.insert(following.clone());
                        next.push(following);
                    }
                }
            }

            frontier = next;
        }

        tracing::info!(
            root,
            max_depth,
            accounts = hood.len(),
            unreachable = hood.unreachable.len(),
            "crawl complete"
        );
        hood
    }
}
