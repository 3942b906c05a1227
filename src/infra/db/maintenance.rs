use async_trait::async_trait;
use tracing::info;

use crate::application::repos::{MaintenanceRepo, RepoError};

use super::{PostgresRepositories, map_sqlx_error};

/// Highest ids belonging to the seed data set.
const SEED_MAX_USER_ID: i32 = 1000;
const SEED_MAX_POST_ID: i32 = 10000;
const SEED_MAX_COMMENT_ID: i32 = 100000;
/// Seed users whose id is a multiple of this are banned after a reset.
const SEED_BAN_MODULUS: i32 = 50;

#[async_trait]
impl MaintenanceRepo for PostgresRepositories {
    async fn reset(&self) -> Result<(), RepoError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;

        let comments = sqlx::query("DELETE FROM comments WHERE id > $1")
            .bind(SEED_MAX_COMMENT_ID)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?
            .rows_affected();
        let posts = sqlx::query("DELETE FROM posts WHERE id > $1")
            .bind(SEED_MAX_POST_ID)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?
            .rows_affected();
        let users = sqlx::query("DELETE FROM users WHERE id > $1")
            .bind(SEED_MAX_USER_ID)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?
            .rows_affected();

        sqlx::query("UPDATE users SET del_flg = (id % $1 = 0)")
            .bind(SEED_BAN_MODULUS)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let banned: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE del_flg")
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        info!(
            target = "infra::db::maintenance",
            deleted_users = users,
            deleted_posts = posts,
            deleted_comments = comments,
            banned = Self::convert_count(banned)?,
            "storage reset to seed data"
        );
        Ok(())
    }
}
