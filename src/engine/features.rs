//! Engagement features and the training label for a single post.

use crate::source::types::{AccountId, Post};
use serde::Serialize;
use std::collections::HashSet;

/// Number of components in a [`FeatureVector`]; the trainer's input width.
pub const FEATURE_COUNT: usize = 4;

/// Signal value when the target account liked or commented on a post.
pub const TARGET_SIGNAL: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureVector {
    pub engagement_score: f64,
    pub avg_follower_engagement: f64,
    pub target_like_signal: f64,
    pub target_comment_signal: f64,
}

impl FeatureVector {
    /// Components in trainer input order.
    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.engagement_score,
            self.avg_follower_engagement,
            self.target_like_signal,
            self.target_comment_signal,
        ]
    }

    /// Training label for this post.
    pub fn post_score(&self) -> f64 {
        post_score(
            self.engagement_score,
            self.avg_follower_engagement,
            Some(self.target_like_signal),
            Some(self.target_comment_signal),
        )
    }
}

/// `(engagement + avg) * (like + comment)`. An absent like signal counts as 1
/// and an absent comment signal as 0; a present zero stays zero.
pub fn post_score(
    engagement_score: f64,
    avg_follower_engagement: f64,
    target_like_signal: Option<f64>,
    target_comment_signal: Option<f64>,
) -> f64 {
    let like = target_like_signal.unwrap_or(1.0);
    let comment = target_comment_signal.unwrap_or(0.0);
    (engagement_score + avg_follower_engagement) * (like + comment)
}

/// Who liked and who commented on one post, for repeated membership checks.
struct Engagement<'a> {
    likers: HashSet<&'a str>,
    commenters: HashSet<&'a str>,
}

impl<'a> Engagement<'a> {
    fn of(post: &'a Post) -> Self {
        Self {
            likers: post.liker_ids.iter().map(String::as_str).collect(),
            commenters: post.commenter_ids.iter().map(String::as_str).collect(),
        }
    }

    /// 0, 1 or 2: one for a like, one for a comment.
    fn score_for(&self, account: &str) -> u32 {
        u32::from(self.likers.contains(account)) + u32::from(self.commenters.contains(account))
    }

    fn score_for_all(&self, accounts: &[AccountId]) -> u32 {
        accounts.iter().map(|a| self.score_for(a)).sum()
    }
}

/// Likes plus comments on `post` by members of `accounts`. Duplicate entries in
/// `accounts` are each counted.
pub fn engagement_score(post: &Post, accounts: &[AccountId]) -> f64 {
    f64::from(Engagement::of(post).score_for_all(accounts))
}

pub fn extract_features(post: &Post, followings: &[AccountId], target: &str) -> FeatureVector {
    let engagement = Engagement::of(post);

    let avg_follower_engagement = if followings.is_empty() {
        0.0
    } else {
        let per_follower: u32 = followings
            .iter()
            .map(|f| engagement.score_for_all(std::slice::from_ref(f)))
            .sum();
        f64::from(per_follower) / followings.len() as f64
    };

    let signal = |engaged: bool| if engaged { TARGET_SIGNAL } else { 0.0 };

    FeatureVector {
        engagement_score: f64::from(engagement.score_for_all(followings)),
        avg_follower_engagement,
        target_like_signal: signal(engagement.likers.contains(target)),
        target_comment_signal: signal(engagement.commenters.contains(target)),
    }
}
