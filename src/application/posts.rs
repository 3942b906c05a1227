//! Uploads, comments and the post-centric read paths.

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{error, info};

use crate::application::error::AppError;
use crate::application::repos::{
    CommentsRepo, CreateCommentParams, CreatePostParams, PostsRepo, RepoError, UsersRepo,
};
use crate::application::timeline::{CommentDepth, Timeline, TimelinePost};
use crate::cache::{CommentIndex, FeedRefresher};
use crate::domain::entities::{CommentRecord, PostRecord, UserRecord};
use crate::domain::images::ImageKind;
use crate::infra::images::{ImageName, ImageStore, ImageStoreError};

const SOURCE: &str = "application::posts";

pub const FLASH_IMAGE_REQUIRED: &str = "an image is required";
pub const FLASH_IMAGE_TYPE: &str = "only jpg, png and gif images can be posted";
pub const FLASH_IMAGE_TOO_LARGE: &str = "the image is too large";

/// Image part of an upload form.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub content_type: String,
    pub data: Bytes,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("no image attached")]
    MissingImage,
    #[error("unsupported image type `{0}`")]
    UnsupportedType(String),
    #[error("image is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Images(#[from] ImageStoreError),
}

impl UploadError {
    pub fn flash(&self) -> Option<&'static str> {
        match self {
            UploadError::MissingImage => Some(FLASH_IMAGE_REQUIRED),
            UploadError::UnsupportedType(_) => Some(FLASH_IMAGE_TYPE),
            UploadError::TooLarge { .. } => Some(FLASH_IMAGE_TOO_LARGE),
            UploadError::Repo(_) | UploadError::Images(_) => None,
        }
    }
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::Repo(err) => AppError::Repo(err),
            UploadError::Images(err) => AppError::Images(err),
            other => AppError::validation(other.to_string()),
        }
    }
}

/// A user page: their posts plus activity counters.
#[derive(Debug, Clone)]
pub struct Profile {
    pub user: UserRecord,
    pub posts: Vec<TimelinePost>,
    pub post_count: usize,
    pub comment_count: i64,
    pub commented_count: i64,
}

#[derive(Clone)]
pub struct PostService {
    posts: Arc<dyn PostsRepo>,
    comments_repo: Arc<dyn CommentsRepo>,
    users: Arc<dyn UsersRepo>,
    comments: Arc<CommentIndex>,
    timeline: Arc<Timeline>,
    images: Arc<ImageStore>,
    refresher: Arc<FeedRefresher>,
    max_upload_bytes: usize,
    candidate_limit: i64,
}

impl PostService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        comments_repo: Arc<dyn CommentsRepo>,
        users: Arc<dyn UsersRepo>,
        comments: Arc<CommentIndex>,
        timeline: Arc<Timeline>,
        images: Arc<ImageStore>,
        refresher: Arc<FeedRefresher>,
        max_upload_bytes: usize,
        candidate_limit: i64,
    ) -> Self {
        Self {
            posts,
            comments_repo,
            users,
            comments,
            timeline,
            images,
            refresher,
            max_upload_bytes,
            candidate_limit,
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    /// Validate the image, insert the post row, write the bytes under the new
    /// id and refresh the feed.
    pub async fn create_post(
        &self,
        user_id: i32,
        image: Option<ImageUpload>,
        body: String,
    ) -> Result<PostRecord, UploadError> {
        let image = image
            .filter(|image| !image.data.is_empty())
            .ok_or(UploadError::MissingImage)?;
        let kind = ImageKind::from_content_type(&image.content_type)
            .map_err(|_| UploadError::UnsupportedType(image.content_type.clone()))?;
        if image.data.len() > self.max_upload_bytes {
            return Err(UploadError::TooLarge {
                size: image.data.len(),
                limit: self.max_upload_bytes,
            });
        }

        let post = self
            .posts
            .create_post(CreatePostParams {
                user_id,
                mime: kind.mime().to_string(),
                body,
            })
            .await?;

        if let Err(err) = self.images.store(post.id, kind, &image.data).await {
            error!(
                target = SOURCE,
                post_id = post.id,
                error = %err,
                "failed to write post image"
            );
            return Err(err.into());
        }

        info!(
            target = SOURCE,
            post_id = post.id,
            user_id,
            bytes = image.data.len(),
            "post created"
        );
        self.refresher.after_write().await;
        Ok(post)
    }

    /// Insert the comment, append it to the cached thread, refresh the feed.
    /// Nothing is cached when the insert fails.
    pub async fn add_comment(
        &self,
        user_id: i32,
        post_id: i32,
        comment: String,
    ) -> Result<CommentRecord, AppError> {
        let record = self
            .comments_repo
            .create_comment(CreateCommentParams {
                post_id,
                user_id,
                comment,
            })
            .await?;

        self.comments.append(record.clone()).await;
        self.refresher.after_write().await;
        Ok(record)
    }

    /// A single post with its whole comment thread.
    pub async fn post_detail(&self, id: i32, csrf_token: &str) -> Result<TimelinePost, AppError> {
        let post = self.posts.find_post(id).await?.ok_or(AppError::NotFound)?;
        self.timeline
            .assemble(vec![post], csrf_token, CommentDepth::Full)
            .await
            .into_iter()
            .next()
            .ok_or(AppError::NotFound)
    }

    /// The page of posts no newer than `max_created_at`.
    pub async fn older_posts(
        &self,
        max_created_at: OffsetDateTime,
        csrf_token: &str,
    ) -> Result<Vec<TimelinePost>, AppError> {
        let candidates = self
            .posts
            .recent_posts(Some(max_created_at), self.candidate_limit)
            .await?;
        Ok(self
            .timeline
            .assemble(candidates, csrf_token, CommentDepth::Preview)
            .await)
    }

    pub async fn profile(&self, account_name: &str, csrf_token: &str) -> Result<Profile, AppError> {
        let user = self
            .users
            .find_active_by_account_name(account_name)
            .await?
            .ok_or(AppError::NotFound)?;

        let posts = self.posts.posts_by_user(user.id).await?;
        let post_ids: Vec<i32> = posts.iter().map(|post| post.id).collect();
        let comment_count = self.comments_repo.count_by_user(user.id).await?;
        let commented_count = if post_ids.is_empty() {
            0
        } else {
            self.comments_repo.count_on_posts(&post_ids).await?
        };

        let post_count = posts.len();
        let posts = self
            .timeline
            .assemble(posts, csrf_token, CommentDepth::Preview)
            .await;

        Ok(Profile {
            user,
            posts,
            post_count,
            comment_count,
            commented_count,
        })
    }

    /// Image bytes for `<id>.<ext>`. The extension must match the post's
    /// MIME type.
    pub async fn image(&self, file_name: &str) -> Result<(ImageKind, Bytes), AppError> {
        let name = ImageName::parse(file_name)?;
        let post = self
            .posts
            .find_post(name.post_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if post.image_kind() != Some(name.kind) {
            return Err(AppError::NotFound);
        }

        let data = self.images.read(name).await?;
        Ok((name.kind, data))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::{TempDir, tempdir};

    use super::*;
    use crate::cache::{FeedRenderError, FeedRenderer, FeedSnapshot, UserDirectory};
    use crate::infra::memory::MemoryRepositories;

    struct IdsRenderer;

    impl FeedRenderer for IdsRenderer {
        fn render_posts(&self, posts: &[TimelinePost]) -> Result<String, FeedRenderError> {
            Ok(posts
                .iter()
                .map(|p| p.post.id.to_string())
                .collect::<Vec<_>>()
                .join(","))
        }
    }

    struct Fixture {
        service: PostService,
        repo: Arc<MemoryRepositories>,
        comments: Arc<CommentIndex>,
        feed: Arc<FeedSnapshot>,
        _dir: TempDir,
    }

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

    async fn fixture() -> Fixture {
        let repo = Arc::new(MemoryRepositories::new());
        repo.seed_user(user(1, "alice"));
        repo.seed_user(user(2, "bob"));

        let directory = Arc::new(UserDirectory::new(repo.clone()));
        directory.bulk_load().await.expect("bulk load");
        let comments = Arc::new(CommentIndex::new(repo.clone()));
        let timeline = Arc::new(Timeline::new(directory, comments.clone(), 20, 3));
        let feed = Arc::new(FeedSnapshot::new(
            repo.clone(),
            timeline.clone(),
            Arc::new(IdsRenderer),
            40,
        ));
        let refresher = Arc::new(FeedRefresher::new(feed.clone(), Duration::ZERO));
        let dir = tempdir().expect("tempdir");
        let images = Arc::new(ImageStore::new(dir.path().to_path_buf()).expect("images"));

        let service = PostService::new(
            repo.clone(),
            repo.clone(),
            repo.clone(),
            comments.clone(),
            timeline,
            images,
            refresher,
            16,
            40,
        );
        Fixture {
            service,
            repo,
            comments,
            feed,
            _dir: dir,
        }
    }

    fn png(data: &'static [u8]) -> Option<ImageUpload> {
        Some(ImageUpload {
            content_type: "image/png".to_string(),
            data: Bytes::from_static(data),
        })
    }

    #[tokio::test]
    async fn upload_stores_image_and_refreshes_feed() {
        let fx = fixture().await;

        let post = fx
            .service
            .create_post(1, png(b"png-bytes"), "hello".to_string())
            .await
            .expect("upload");

        assert_eq!(post.mime, "image/png");
        assert_eq!(fx.feed.render(""), post.id.to_string());

        let (kind, data) = fx
            .service
            .image(&format!("{}.png", post.id))
            .await
            .expect("image");
        assert_eq!(kind, ImageKind::Png);
        assert_eq!(data, Bytes::from_static(b"png-bytes"));

        assert!(matches!(
            fx.service.image(&format!("{}.jpg", post.id)).await,
            Err(AppError::NotFound)
        ));
    }

    #[tokio::test]
    async fn upload_rejections_carry_flash_messages() {
        let fx = fixture().await;

        let missing = fx
            .service
            .create_post(1, None, String::new())
            .await
            .expect_err("missing");
        assert_eq!(missing.flash(), Some(FLASH_IMAGE_REQUIRED));

        let bmp = fx
            .service
            .create_post(
                1,
                Some(ImageUpload {
                    content_type: "image/bmp".to_string(),
                    data: Bytes::from_static(b"bm"),
                }),
                String::new(),
            )
            .await
            .expect_err("bmp");
        assert_eq!(bmp.flash(), Some(FLASH_IMAGE_TYPE));

        let large = fx
            .service
            .create_post(1, png(b"0123456789abcdefXYZ"), String::new())
            .await
            .expect_err("too large");
        assert_eq!(large.flash(), Some(FLASH_IMAGE_TOO_LARGE));
    }

    #[tokio::test]
    async fn comment_is_appended_after_existing_ones() {
        let fx = fixture().await;
        fx.repo.seed_post(PostRecord {
            id: 10,
            user_id: 2,
            mime: "image/jpeg".to_string(),
            body: String::new(),
            created_at: OffsetDateTime::now_utc(),
        });
        fx.repo.seed_comment(CommentRecord {
            id: 1,
            post_id: 10,
            user_id: 2,
            author_name: "bob".to_string(),
            comment: "first".to_string(),
            created_at: OffsetDateTime::now_utc() - Duration::from_secs(60),
        });
        let before = fx.comments.list(10).await.len();

        let record = fx
            .service
            .add_comment(1, 10, "nice".to_string())
            .await
            .expect("comment");

        let thread = fx.comments.list(10).await;
        assert_eq!(thread.len(), before + 1);
        assert_eq!(thread.last(), Some(&record));
        assert_eq!(record.author_name, "alice");
    }

    #[tokio::test]
    async fn failed_comment_insert_leaves_cache_untouched() {
        let fx = fixture().await;
        assert!(fx.comments.list(10).await.is_empty());

        fx.repo.set_unavailable(true);
        assert!(
            fx.service
                .add_comment(1, 10, "lost".to_string())
                .await
                .is_err()
        );
        fx.repo.set_unavailable(false);

        assert!(fx.comments.list(10).await.is_empty());
    }

    #[tokio::test]
    async fn profile_counts_activity() {
        let fx = fixture().await;
        let now = OffsetDateTime::now_utc();
        for id in [1, 2] {
            fx.repo.seed_post(PostRecord {
                id,
                user_id: 1,
                mime: "image/gif".to_string(),
                body: String::new(),
                created_at: now,
            });
        }
        fx.service
            .add_comment(2, 1, "from bob".to_string())
            .await
            .expect("bob");
        fx.service
            .add_comment(1, 2, "from alice".to_string())
            .await
            .expect("alice");

        let profile = fx.service.profile("alice", "tok").await.expect("profile");
        assert_eq!(profile.post_count, 2);
        assert_eq!(profile.comment_count, 1);
        assert_eq!(profile.commented_count, 2);
        assert!(profile.posts.iter().all(|p| p.csrf_token == "tok"));

        assert!(matches!(
            fx.service.profile("nobody", "").await,
            Err(AppError::NotFound)
        ));
    }

    #[tokio::test]
    async fn detail_of_a_post_outside_the_directory_is_not_found() {
        let fx = fixture().await;
        let mut banned = user(3, "eve");
        banned.banned = true;
        fx.repo.seed_user(banned);
        fx.repo.seed_post(PostRecord {
            id: 5,
            user_id: 3,
            mime: "image/png".to_string(),
            body: String::new(),
            created_at: OffsetDateTime::now_utc(),
        });

        assert!(matches!(
            fx.service.post_detail(5, "").await,
            Err(AppError::NotFound)
        ));
    }
}
