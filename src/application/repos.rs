//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::entities::{CommentRecord, PostRecord, UserRecord};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CreateUserParams {
    pub account_name: String,
    pub passhash: String,
}

#[derive(Debug, Clone)]
pub struct CreatePostParams {
    pub user_id: i32,
    pub mime: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct CreateCommentParams {
    pub post_id: i32,
    pub user_id: i32,
    pub comment: String,
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    /// Every user row, banned or not.
    async fn list_users(&self) -> Result<Vec<UserRecord>, RepoError>;

    /// Unbanned user with the given account name.
    async fn find_active_by_account_name(
        &self,
        account_name: &str,
    ) -> Result<Option<UserRecord>, RepoError>;

    /// Whether any user, banned or not, holds the account name.
    async fn account_name_exists(&self, account_name: &str) -> Result<bool, RepoError>;

    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError>;

    /// Mark the given users as banned and return how many rows changed.
    async fn ban_users(&self, ids: &[i32]) -> Result<u64, RepoError>;

    /// Unbanned non-admin users, newest first.
    async fn list_bannable_users(&self) -> Result<Vec<UserRecord>, RepoError>;
}

#[async_trait]
pub trait PostsRepo: Send + Sync {
    /// Newest posts by unbanned authors, optionally no newer than `max_created_at`.
    async fn recent_posts(
        &self,
        max_created_at: Option<OffsetDateTime>,
        limit: i64,
    ) -> Result<Vec<PostRecord>, RepoError>;

    async fn find_post(&self, id: i32) -> Result<Option<PostRecord>, RepoError>;

    /// All posts by one author, newest first.
    async fn posts_by_user(&self, user_id: i32) -> Result<Vec<PostRecord>, RepoError>;

    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError>;
}

#[async_trait]
pub trait CommentsRepo: Send + Sync {
    /// Comments on a post joined with author names, oldest first.
    async fn comments_for_post(&self, post_id: i32) -> Result<Vec<CommentRecord>, RepoError>;

    async fn create_comment(
        &self,
        params: CreateCommentParams,
    ) -> Result<CommentRecord, RepoError>;

    async fn count_by_user(&self, user_id: i32) -> Result<i64, RepoError>;

    async fn count_on_posts(&self, post_ids: &[i32]) -> Result<i64, RepoError>;
}

#[async_trait]
pub trait MaintenanceRepo: Send + Sync {
    /// Drop everything created after the seed data and restore the seed bans.
    async fn reset(&self) -> Result<(), RepoError>;
}
