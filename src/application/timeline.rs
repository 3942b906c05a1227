//! Assembles renderable posts from storage rows and the in-process caches.

use std::sync::Arc;

use time::format_description::well_known::Rfc3339;
use tracing::debug;

use crate::cache::{CommentIndex, UserDirectory};
use crate::domain::entities::{CommentRecord, PostRecord, UserRecord};

const SOURCE: &str = "application::timeline";

/// How much of each comment thread to attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentDepth {
    /// Only the newest `comment_preview` comments.
    Preview,
    /// The whole thread, for the single-post view.
    Full,
}

/// A post ready for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelinePost {
    pub post: PostRecord,
    pub author: UserRecord,
    pub comments: Vec<CommentRecord>,
    pub comment_count: usize,
    pub csrf_token: String,
}

impl TimelinePost {
    pub fn image_url(&self) -> String {
        self.post.image_url()
    }

    pub fn created_at_rfc3339(&self) -> String {
        format_timestamp(self.post.created_at)
    }
}

pub fn format_timestamp(value: time::OffsetDateTime) -> String {
    value.format(&Rfc3339).unwrap_or_default()
}

pub struct Timeline {
    users: Arc<UserDirectory>,
    comments: Arc<CommentIndex>,
    post_limit: usize,
    comment_preview: usize,
}

impl Timeline {
    pub fn new(
        users: Arc<UserDirectory>,
        comments: Arc<CommentIndex>,
        post_limit: usize,
        comment_preview: usize,
    ) -> Self {
        Self {
            users,
            comments,
            post_limit,
            comment_preview,
        }
    }

    pub fn post_limit(&self) -> usize {
        self.post_limit
    }

    /// Walk `posts` in order, dropping posts whose author is banned or not in
    /// the directory, until `post_limit` posts are collected. The ban filter
    /// runs here, at read time, against the directory's current flags.
    pub async fn assemble(
        &self,
        posts: Vec<PostRecord>,
        csrf_token: &str,
        depth: CommentDepth,
    ) -> Vec<TimelinePost> {
        let mut assembled = Vec::with_capacity(posts.len().min(self.post_limit));

        for post in posts {
            if assembled.len() >= self.post_limit {
                break;
            }

            let Some(author) = self.users.get(post.user_id).await else {
                debug!(
                    target = SOURCE,
                    post_id = post.id,
                    user_id = post.user_id,
                    "skipping post with unknown author"
                );
                continue;
            };
            if author.banned {
                continue;
            }

            let thread = self.comments.list(post.id).await;
            let comment_count = thread.len();
            let skip = match depth {
                CommentDepth::Full => 0,
                CommentDepth::Preview => comment_count.saturating_sub(self.comment_preview),
            };

            assembled.push(TimelinePost {
                post,
                author,
                comments: thread[skip..].to_vec(),
                comment_count,
                csrf_token: csrf_token.to_string(),
            });
        }

        assembled
    }
}
