//! In-process user directory.
//!
//! Maps user ids to the latest known record so rendering a row never needs a
//! storage round-trip. The directory is filled in bulk at startup and on
//! reset; afterwards it only changes through explicit `upsert` and
//! `set_banned` calls. A miss is answered with `None`, never a read-through.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::gauge;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::application::repos::{RepoError, UsersRepo};
use crate::domain::entities::UserRecord;

const SOURCE: &str = "cache::users";

pub struct UserDirectory {
    repo: Arc<dyn UsersRepo>,
    users: Mutex<HashMap<i32, UserRecord>>,
}

impl UserDirectory {
    pub fn new(repo: Arc<dyn UsersRepo>) -> Self {
        Self {
            repo,
            users: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the whole directory with a fresh scan of storage.
    ///
    /// The lock is held across the scan, so an `upsert` racing with a reload
    /// lands after it instead of being overwritten by a stale snapshot. On a
    /// storage failure the previous contents stay in place.
    pub async fn bulk_load(&self) -> Result<usize, RepoError> {
        let mut users = self.users.lock().await;

        let records = self.repo.list_users().await.map_err(|err| {
            error!(target = SOURCE, error = %err, "failed to load user directory");
            err
        })?;

        users.clear();
        users.extend(records.into_iter().map(|user| (user.id, user)));

        let loaded = users.len();
        gauge!("pixfeed_user_directory_size").set(loaded as f64);
        info!(target = SOURCE, users = loaded, "user directory loaded");
        Ok(loaded)
    }

    /// Insert or overwrite one entry. The record is moved in whole, so readers
    /// see either the previous record or this one.
    pub async fn upsert(&self, user: UserRecord) {
        let mut users = self.users.lock().await;
        users.insert(user.id, user);
        gauge!("pixfeed_user_directory_size").set(users.len() as f64);
    }

    /// Copy of the cached record, or `None` when the id is unknown.
    pub async fn get(&self, id: i32) -> Option<UserRecord> {
        self.users.lock().await.get(&id).cloned()
    }

    /// Flip the banned flag on the cached copy. Returns `false` when the id
    /// is not in the directory.
    pub async fn set_banned(&self, id: i32, banned: bool) -> bool {
        match self.users.lock().await.get_mut(&id) {
            Some(user) => {
                user.banned = banned;
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.users.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use time::OffsetDateTime;

    use super::*;
    use crate::infra::memory::MemoryRepositories;

    fn user(id: i32, name: &str) -> UserRecord {
        UserRecord {
            id,
            account_name: name.to_string(),
            passhash: String::new(),
            authority: false,
            banned: false,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn get_after_upsert_returns_the_record() {
        let repo = Arc::new(MemoryRepositories::new());
        let directory = UserDirectory::new(repo);

        let alice = user(5, "alice");
        directory.upsert(alice.clone()).await;

        assert_eq!(directory.get(5).await, Some(alice));
        assert_eq!(directory.get(6).await, None);
    }

    #[tokio::test]
    async fn miss_never_reads_through() {
        let repo = Arc::new(MemoryRepositories::new());
        repo.seed_user(user(1, "carol"));
        let directory = UserDirectory::new(repo.clone());

        assert_eq!(directory.get(1).await, None);
        assert_eq!(repo.stats().user_scans.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn bulk_load_replaces_previous_contents() {
        let repo = Arc::new(MemoryRepositories::new());
        repo.seed_user(user(1, "carol"));
        repo.seed_user(user(2, "dave"));
        let directory = UserDirectory::new(repo.clone());
        directory.upsert(user(99, "ghost")).await;

        let loaded = directory.bulk_load().await.expect("bulk load");

        assert_eq!(loaded, 2);
        assert_eq!(directory.get(99).await, None);
        assert_eq!(
            directory.get(2).await.map(|u| u.account_name),
            Some("dave".to_string())
        );
    }

    #[tokio::test]
    async fn failed_bulk_load_keeps_previous_contents() {
        let repo = Arc::new(MemoryRepositories::new());
        let directory = UserDirectory::new(repo.clone());
        directory.upsert(user(1, "carol")).await;

        repo.set_unavailable(true);
        assert!(directory.bulk_load().await.is_err());
        assert!(directory.get(1).await.is_some());
    }

    #[tokio::test]
    async fn set_banned_flips_only_the_cached_flag() {
        let repo = Arc::new(MemoryRepositories::new());
        let directory = UserDirectory::new(repo);
        directory.upsert(user(4, "erin")).await;

        assert!(directory.set_banned(4, true).await);
        assert!(!directory.set_banned(40, true).await);

        let cached = directory.get(4).await.expect("cached");
        assert!(cached.banned);
        assert_eq!(cached.account_name, "erin");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_upserts_and_reads_on_distinct_ids() {
        let repo = Arc::new(MemoryRepositories::new());
        let directory = Arc::new(UserDirectory::new(repo));

        let mut tasks = Vec::new();
        for id in 0..32 {
            let directory = Arc::clone(&directory);
            tasks.push(tokio::spawn(async move {
                directory.upsert(user(id, &format!("user_{id}"))).await;
                directory.get(id).await
            }));
        }

        for (id, task) in tasks.into_iter().enumerate() {
            let found = task.await.expect("task").expect("record");
            assert_eq!(found.id, id as i32);
            assert_eq!(found.account_name, format!("user_{id}"));
        }
        assert_eq!(directory.len().await, 32);
    }
}
