use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{CommentsRepo, CreateCommentParams, RepoError},
    domain::entities::CommentRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: i32,
    post_id: i32,
    user_id: i32,
    author_name: String,
    comment: String,
    created_at: OffsetDateTime,
}

impl From<CommentRow> for CommentRecord {
    fn from(row: CommentRow) -> Self {
        Self {
            id: row.id,
            post_id: row.post_id,
            user_id: row.user_id,
            author_name: row.author_name,
            comment: row.comment,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl CommentsRepo for PostgresRepositories {
    async fn comments_for_post(&self, post_id: i32) -> Result<Vec<CommentRecord>, RepoError> {
        let rows = sqlx::query_as::<_, CommentRow>(
            r#"
            SELECT c.id, c.post_id, c.user_id, u.account_name AS author_name,
                   c.comment, c.created_at
            FROM comments c
            INNER JOIN users u ON u.id = c.user_id
            WHERE c.post_id = $1
            ORDER BY c.created_at ASC, c.id ASC
            "#,
        )
        .bind(post_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(CommentRecord::from).collect())
    }

    async fn create_comment(
        &self,
        params: CreateCommentParams,
    ) -> Result<CommentRecord, RepoError> {
        let row = sqlx::query_as::<_, CommentRow>(
            r#"
            WITH inserted AS (
                INSERT INTO comments (post_id, user_id, comment)
                VALUES ($1, $2, $3)
                RETURNING id, post_id, user_id, comment, created_at
            )
            SELECT i.id, i.post_id, i.user_id, u.account_name AS author_name,
                   i.comment, i.created_at
            FROM inserted i
            INNER JOIN users u ON u.id = i.user_id
            "#,
        )
        .bind(params.post_id)
        .bind(params.user_id)
        .bind(&params.comment)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn count_by_user(&self, user_id: i32) -> Result<i64, RepoError> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM comments WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)
    }

    async fn count_on_posts(&self, post_ids: &[i32]) -> Result<i64, RepoError> {
        if post_ids.is_empty() {
            return Ok(0);
        }

        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM comments WHERE post_id = ANY($1)")
            .bind(post_ids)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)
    }
}
