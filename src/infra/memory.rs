//! In-memory repositories.
//!
//! Implements every repository trait over plain vectors so the caches,
//! services and router can be exercised without Postgres. Query counters and
//! an availability switch let tests observe read-through behavior and
//! storage failures.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::application::repos::{
    CommentsRepo, CreateCommentParams, CreatePostParams, CreateUserParams, MaintenanceRepo,
    PostsRepo, RepoError, UsersRepo,
};
use crate::domain::entities::{CommentRecord, PostRecord, UserRecord};

const SOURCE: &str = "infra::memory";

#[derive(Debug, Default)]
pub struct RepoStats {
    pub user_scans: AtomicUsize,
    pub post_queries: AtomicUsize,
    pub comment_queries: AtomicUsize,
}

#[derive(Default)]
struct Tables {
    users: Vec<UserRecord>,
    posts: Vec<PostRecord>,
    comments: Vec<CommentRecord>,
}

#[derive(Default)]
pub struct MemoryRepositories {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
    post_query_delay: Mutex<Duration>,
    stats: RepoStats,
}

impl MemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &RepoStats {
        &self.stats
    }

    /// Make every query fail with a persistence error until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay applied to `recent_posts`, to hold a feed refresh in flight.
    pub fn set_post_query_delay(&self, delay: Duration) {
        *self.lock_delay() = delay;
    }

    pub fn seed_user(&self, user: UserRecord) {
        let mut tables = self.lock();
        tables.users.retain(|existing| existing.id != user.id);
        tables.users.push(user);
    }

    pub fn seed_post(&self, post: PostRecord) {
        self.lock().posts.push(post);
    }

    pub fn seed_comment(&self, comment: CommentRecord) {
        self.lock().comments.push(comment);
    }

    pub fn user_by_name(&self, account_name: &str) -> Option<UserRecord> {
        self.lock()
            .users
            .iter()
            .find(|user| user.account_name == account_name)
            .cloned()
    }

    pub fn comment_rows(&self, post_id: i32) -> usize {
        self.lock()
            .comments
            .iter()
            .filter(|comment| comment.post_id == post_id)
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_delay(&self) -> std::sync::MutexGuard<'_, Duration> {
        self.post_query_delay
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_available(&self) -> Result<(), RepoError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(RepoError::from_persistence(format!(
                "{SOURCE}: storage unavailable"
            )))
        } else {
            Ok(())
        }
    }

    fn next_id(ids: impl Iterator<Item = i32>) -> i32 {
        ids.max().unwrap_or(0) + 1
    }
}

fn newest_first(posts: &mut [PostRecord]) {
    posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

#[async_trait]
impl UsersRepo for MemoryRepositories {
    async fn list_users(&self) -> Result<Vec<UserRecord>, RepoError> {
        self.stats.user_scans.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.lock().users.clone())
    }

    async fn find_active_by_account_name(
        &self,
        account_name: &str,
    ) -> Result<Option<UserRecord>, RepoError> {
        self.check_available()?;
        Ok(self
            .lock()
            .users
            .iter()
            .find(|user| user.account_name == account_name && !user.banned)
            .cloned())
    }

    async fn account_name_exists(&self, account_name: &str) -> Result<bool, RepoError> {
        self.check_available()?;
        Ok(self
            .lock()
            .users
            .iter()
            .any(|user| user.account_name == account_name))
    }

    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        self.check_available()?;
        let mut tables = self.lock();
        if tables
            .users
            .iter()
            .any(|user| user.account_name == params.account_name)
        {
            return Err(RepoError::Duplicate {
                constraint: "users_account_name_key".to_string(),
            });
        }

        let user = UserRecord {
            id: Self::next_id(tables.users.iter().map(|user| user.id)),
            account_name: params.account_name,
            passhash: params.passhash,
            authority: false,
            banned: false,
            created_at: OffsetDateTime::now_utc(),
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn ban_users(&self, ids: &[i32]) -> Result<u64, RepoError> {
        self.check_available()?;
        let mut changed = 0;
        for user in self.lock().users.iter_mut() {
            if ids.contains(&user.id) {
                user.banned = true;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn list_bannable_users(&self) -> Result<Vec<UserRecord>, RepoError> {
        self.check_available()?;
        let mut users: Vec<UserRecord> = self
            .lock()
            .users
            .iter()
            .filter(|user| !user.authority && !user.banned)
            .cloned()
            .collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }
}

#[async_trait]
impl PostsRepo for MemoryRepositories {
    async fn recent_posts(
        &self,
        max_created_at: Option<OffsetDateTime>,
        limit: i64,
    ) -> Result<Vec<PostRecord>, RepoError> {
        self.stats.post_queries.fetch_add(1, Ordering::SeqCst);
        let delay = *self.lock_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.check_available()?;

        let tables = self.lock();
        let mut posts: Vec<PostRecord> = tables
            .posts
            .iter()
            .filter(|post| max_created_at.is_none_or(|max| post.created_at <= max))
            .filter(|post| {
                tables
                    .users
                    .iter()
                    .any(|user| user.id == post.user_id && !user.banned)
            })
            .cloned()
            .collect();
        newest_first(&mut posts);
        posts.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(posts)
    }

    async fn find_post(&self, id: i32) -> Result<Option<PostRecord>, RepoError> {
        self.check_available()?;
        Ok(self.lock().posts.iter().find(|post| post.id == id).cloned())
    }

    async fn posts_by_user(&self, user_id: i32) -> Result<Vec<PostRecord>, RepoError> {
        self.check_available()?;
        let mut posts: Vec<PostRecord> = self
            .lock()
            .posts
            .iter()
            .filter(|post| post.user_id == user_id)
            .cloned()
            .collect();
        newest_first(&mut posts);
        Ok(posts)
    }

    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        self.check_available()?;
        let mut tables = self.lock();
        let post = PostRecord {
            id: Self::next_id(tables.posts.iter().map(|post| post.id)),
            user_id: params.user_id,
            mime: params.mime,
            body: params.body,
            created_at: OffsetDateTime::now_utc(),
        };
        tables.posts.push(post.clone());
        Ok(post)
    }
}

#[async_trait]
impl CommentsRepo for MemoryRepositories {
    async fn comments_for_post(&self, post_id: i32) -> Result<Vec<CommentRecord>, RepoError> {
        self.stats.comment_queries.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let mut comments: Vec<CommentRecord> = self
            .lock()
            .comments
            .iter()
            .filter(|comment| comment.post_id == post_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(comments)
    }

    async fn create_comment(
        &self,
        params: CreateCommentParams,
    ) -> Result<CommentRecord, RepoError> {
        self.check_available()?;
        let mut tables = self.lock();
        let author_name = tables
            .users
            .iter()
            .find(|user| user.id == params.user_id)
            .map(|user| user.account_name.clone())
            .ok_or_else(|| RepoError::InvalidInput {
                message: format!("unknown user {}", params.user_id),
            })?;

        let comment = CommentRecord {
            id: Self::next_id(tables.comments.iter().map(|comment| comment.id)),
            post_id: params.post_id,
            user_id: params.user_id,
            author_name,
            comment: params.comment,
            created_at: OffsetDateTime::now_utc(),
        };
        tables.comments.push(comment.clone());
        Ok(comment)
    }

    async fn count_by_user(&self, user_id: i32) -> Result<i64, RepoError> {
        self.check_available()?;
        Ok(self
            .lock()
            .comments
            .iter()
            .filter(|comment| comment.user_id == user_id)
            .count() as i64)
    }

    async fn count_on_posts(&self, post_ids: &[i32]) -> Result<i64, RepoError> {
        self.check_available()?;
        Ok(self
            .lock()
            .comments
            .iter()
            .filter(|comment| post_ids.contains(&comment.post_id))
            .count() as i64)
    }
}

#[async_trait]
impl MaintenanceRepo for MemoryRepositories {
    async fn reset(&self) -> Result<(), RepoError> {
        self.check_available()?;
        let mut tables = self.lock();
        tables.users.retain(|user| user.id <= 1000);
        tables.posts.retain(|post| post.id <= 10000);
        tables.comments.retain(|comment| comment.id <= 100000);
        for user in tables.users.iter_mut() {
            user.banned = user.id % 50 == 0;
        }
        Ok(())
    }
}
