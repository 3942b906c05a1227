//! Cache configuration.
//!
//! Feed snapshot and refresh trigger tuning, derived from the `cache`
//! settings section.

use std::time::Duration;

const DEFAULT_FEED_POST_LIMIT: usize = 20;
const DEFAULT_FEED_CANDIDATE_LIMIT: usize = 40;
const DEFAULT_COMMENT_PREVIEW: usize = 3;
const DEFAULT_REFRESH_SETTLE_MS: u64 = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum posts rendered into one feed page.
    pub feed_post_limit: usize,
    /// Rows fetched from storage per feed page before banned authors are
    /// filtered out. Must be at least `feed_post_limit`.
    pub feed_candidate_limit: usize,
    /// Trailing comments shown per post outside the full-thread view.
    pub comment_preview: usize,
    /// Delay between a committed write and the feed refresh it triggers.
    /// Zero refreshes inline.
    pub refresh_settle_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            feed_post_limit: DEFAULT_FEED_POST_LIMIT,
            feed_candidate_limit: DEFAULT_FEED_CANDIDATE_LIMIT,
            comment_preview: DEFAULT_COMMENT_PREVIEW,
            refresh_settle_ms: DEFAULT_REFRESH_SETTLE_MS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            feed_post_limit: settings.feed_post_limit.get(),
            feed_candidate_limit: settings.feed_candidate_limit.get(),
            comment_preview: settings.comment_preview,
            refresh_settle_ms: settings.refresh_settle.as_millis() as u64,
        }
    }
}

impl CacheConfig {
    pub fn refresh_settle(&self) -> Duration {
        Duration::from_millis(self.refresh_settle_ms)
    }

    /// Candidate rows per feed query, never below the page size.
    pub fn candidate_limit(&self) -> i64 {
        self.feed_candidate_limit.max(self.feed_post_limit) as i64
    }
}
