//! Benchmark reset: restore seed data and rebuild the caches that depend on it.

use std::sync::Arc;

use tracing::info;

use crate::application::error::AppError;
use crate::application::repos::MaintenanceRepo;
use crate::cache::{FeedSnapshot, RefreshOutcome, UserDirectory};

const SOURCE: &str = "application::maintenance";

#[derive(Clone)]
pub struct MaintenanceService {
    repo: Arc<dyn MaintenanceRepo>,
    users: Arc<UserDirectory>,
    feed: Arc<FeedSnapshot>,
}

impl MaintenanceService {
    pub fn new(
        repo: Arc<dyn MaintenanceRepo>,
        users: Arc<UserDirectory>,
        feed: Arc<FeedSnapshot>,
    ) -> Self {
        Self { repo, users, feed }
    }

    /// Reset storage, reload the user directory and re-render the feed.
    ///
    /// Cached comment threads are kept as they are. Comments the reset deletes
    /// from storage stay visible in any thread that cached them until the
    /// process restarts.
    pub async fn initialize(&self) -> Result<RefreshOutcome, AppError> {
        self.repo.reset().await?;
        let users = self.users.bulk_load().await?;
        let outcome = self.feed.refresh().await;
        info!(target = SOURCE, users, outcome = ?outcome, "storage initialized");
        Ok(outcome)
    }
}
