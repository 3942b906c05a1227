//! Pre-rendered landing-page feed.
//!
//! The fragment is rendered once with [`CSRF_PLACEHOLDER`] wherever a form
//! needs the CSRF token, and `render` substitutes the caller's token. The same
//! cached bytes therefore serve every session.
//!
//! Two locks are involved. The refresh gate serializes the whole
//! check-and-recompute step, so overlapping refreshes cannot both pass the
//! staleness check. The published fragment sits behind its own `RwLock`,
//! which is only write-locked for the final swap.

use std::sync::{Arc, RwLock};
use std::time::Instant;

use metrics::counter;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::application::repos::PostsRepo;
use crate::application::timeline::{CommentDepth, Timeline, TimelinePost};

use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::feed";

/// Marker rendered in place of the per-request CSRF token.
pub const CSRF_PLACEHOLDER: &str = "__PIXFEED_CSRF_TOKEN__";

#[derive(Debug, Error)]
#[error("failed to render feed fragment: {0}")]
pub struct FeedRenderError(pub String);

/// Turns assembled posts into the HTML fragment shown on the landing page.
pub trait FeedRenderer: Send + Sync {
    fn render_posts(&self, posts: &[TimelinePost]) -> Result<String, FeedRenderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new fragment was published.
    Rendered { posts: usize },
    /// A recompute started after this call was made, so it already covers
    /// every write that preceded the call.
    Skipped,
    /// Storage or rendering failed; the previous fragment stays published.
    Failed,
}

pub struct FeedSnapshot {
    posts: Arc<dyn PostsRepo>,
    timeline: Arc<Timeline>,
    renderer: Arc<dyn FeedRenderer>,
    candidate_limit: i64,
    last_render: Mutex<Option<Instant>>,
    fragment: RwLock<Arc<str>>,
}

impl FeedSnapshot {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        timeline: Arc<Timeline>,
        renderer: Arc<dyn FeedRenderer>,
        candidate_limit: i64,
    ) -> Self {
        Self {
            posts,
            timeline,
            renderer,
            candidate_limit,
            last_render: Mutex::new(None),
            fragment: RwLock::new(Arc::from("")),
        }
    }

    /// Recompute and publish the fragment unless a recompute began at or
    /// after the moment of this call.
    ///
    /// The timestamp is read under the gate, and the gate is held through the
    /// storage queries and rendering. The gate is always taken before the
    /// user directory and comment index locks, never while holding them.
    pub async fn refresh(&self) -> RefreshOutcome {
        let invoked = Instant::now();
        let mut last_render = self.last_render.lock().await;

        if last_render.is_some_and(|rendered| rendered >= invoked) {
            counter!("pixfeed_feed_refresh_skipped_total").increment(1);
            debug!(target = SOURCE, "feed refresh already covered");
            return RefreshOutcome::Skipped;
        }

        let started = Instant::now();
        let candidates = match self.posts.recent_posts(None, self.candidate_limit).await {
            Ok(posts) => posts,
            Err(err) => {
                error!(target = SOURCE, error = %err, "failed to query feed posts");
                return RefreshOutcome::Failed;
            }
        };

        let posts = self
            .timeline
            .assemble(candidates, CSRF_PLACEHOLDER, CommentDepth::Preview)
            .await;

        let rendered = match self.renderer.render_posts(&posts) {
            Ok(html) => html,
            Err(err) => {
                error!(target = SOURCE, error = %err, "failed to render feed");
                return RefreshOutcome::Failed;
            }
        };

        *last_render = Some(started);
        *rw_write(&self.fragment, SOURCE, "refresh.publish") = Arc::from(rendered);
        drop(last_render);

        counter!("pixfeed_feed_render_total").increment(1);
        info!(
            target = SOURCE,
            posts = posts.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "feed snapshot refreshed"
        );
        RefreshOutcome::Rendered { posts: posts.len() }
    }

    /// The published fragment with the placeholder replaced by `csrf_token`.
    /// Never triggers a refresh.
    pub fn render(&self, csrf_token: &str) -> String {
        let fragment = Arc::clone(&rw_read(&self.fragment, SOURCE, "render"));
        fragment.replace(CSRF_PLACEHOLDER, csrf_token)
    }
}
