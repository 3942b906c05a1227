//! Wires repositories, caches and services into the HTTP state.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    application::{
        accounts::AccountService,
        error::AppError,
        maintenance::MaintenanceService,
        posts::PostService,
        repos::{CommentsRepo, MaintenanceRepo, PostsRepo, UsersRepo},
        timeline::Timeline,
    },
    cache::{CacheConfig, CommentIndex, FeedRefresher, FeedSnapshot, SessionStore, UserDirectory},
    config::Settings,
    infra::{error::InfraError, http::HttpState, images::ImageStore},
    presentation::views::AskamaFeedRenderer,
};

const SOURCE: &str = "infra::bootstrap";

/// One handle per repository seam.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UsersRepo>,
    pub posts: Arc<dyn PostsRepo>,
    pub comments: Arc<dyn CommentsRepo>,
    pub maintenance: Arc<dyn MaintenanceRepo>,
}

impl Repositories {
    /// Use a single adapter for every seam.
    pub fn shared<R>(repo: Arc<R>) -> Self
    where
        R: UsersRepo + PostsRepo + CommentsRepo + MaintenanceRepo + 'static,
    {
        Self {
            users: repo.clone(),
            posts: repo.clone(),
            comments: repo.clone(),
            maintenance: repo,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StateOptions {
    pub cache: CacheConfig,
    pub images_directory: PathBuf,
    pub max_upload_bytes: usize,
}

impl From<&Settings> for StateOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            cache: CacheConfig::from(&settings.cache),
            images_directory: settings.images.directory.clone(),
            max_upload_bytes: settings.images.max_upload_bytes.get(),
        }
    }
}

/// Build every cache and service, load the user directory and publish the
/// first feed.
///
/// A failed directory load is logged and startup continues with an empty
/// directory; `/initialize` reloads it.
pub async fn build_http_state(
    repos: Repositories,
    options: &StateOptions,
) -> Result<HttpState, AppError> {
    let cache = &options.cache;

    let directory = Arc::new(UserDirectory::new(repos.users.clone()));
    if let Err(err) = directory.bulk_load().await {
        warn!(target = SOURCE, error = %err, "starting with an empty user directory");
    }

    let comments = Arc::new(CommentIndex::new(repos.comments.clone()));
    let timeline = Arc::new(Timeline::new(
        directory.clone(),
        comments.clone(),
        cache.feed_post_limit,
        cache.comment_preview,
    ));
    let feed = Arc::new(FeedSnapshot::new(
        repos.posts.clone(),
        timeline.clone(),
        Arc::new(AskamaFeedRenderer),
        cache.candidate_limit(),
    ));
    let refresher = Arc::new(FeedRefresher::new(feed.clone(), cache.refresh_settle()));
    let images = Arc::new(
        ImageStore::new(options.images_directory.clone())
            .map_err(|err| AppError::from(InfraError::from(err)))?,
    );

    let accounts = AccountService::new(repos.users.clone(), directory.clone(), refresher.clone());
    let posts = PostService::new(
        repos.posts.clone(),
        repos.comments.clone(),
        repos.users.clone(),
        comments,
        timeline,
        images,
        refresher,
        options.max_upload_bytes,
        cache.candidate_limit(),
    );
    let maintenance = MaintenanceService::new(repos.maintenance, directory, feed.clone());

    let outcome = feed.refresh().await;
    info!(target = SOURCE, outcome = ?outcome, "initial feed published");

    Ok(HttpState {
        sessions: Arc::new(SessionStore::new()),
        accounts,
        posts,
        maintenance,
        feed,
    })
}
