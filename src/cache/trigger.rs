//! Feed refresh trigger.
//!
//! Writes that change what the landing page shows (new post, new comment,
//! ban) call [`FeedRefresher::after_write`] once their storage write has
//! committed.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::feed::{FeedSnapshot, RefreshOutcome};

pub struct FeedRefresher {
    feed: Arc<FeedSnapshot>,
    settle: Duration,
}

impl FeedRefresher {
    pub fn new(feed: Arc<FeedSnapshot>, settle: Duration) -> Self {
        Self { feed, settle }
    }

    /// Refresh the feed after a committed write.
    ///
    /// With a zero settle delay the refresh runs inline and its outcome is
    /// returned. Otherwise it runs on a spawned task after the delay and the
    /// caller gets `None` immediately; the feed is then only eventually
    /// fresh.
    pub async fn after_write(&self) -> Option<RefreshOutcome> {
        if self.settle.is_zero() {
            return Some(self.feed.refresh().await);
        }

        let feed = Arc::clone(&self.feed);
        let settle = self.settle;
        tokio::spawn(async move {
            tokio::time::sleep(settle).await;
            let outcome = feed.refresh().await;
            debug!(outcome = ?outcome, "deferred feed refresh finished");
        });
        None
    }

    pub fn feed(&self) -> &Arc<FeedSnapshot> {
        &self.feed
    }

    pub fn settle(&self) -> Duration {
        self.settle
    }
}
