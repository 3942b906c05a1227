//! HTTP surface: routing, session cookie handling and handlers.

mod accounts;
mod admin;
mod middleware;
mod public;
mod session;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
};

use crate::application::{
    accounts::AccountService, maintenance::MaintenanceService, posts::PostService,
};
use crate::cache::{FeedSnapshot, SessionStore};

pub use middleware::REQUEST_ID_HEADER;

/// Multipart framing overhead allowed on top of the image size limit, so an
/// oversized image is rejected by the upload check rather than the extractor.
const MULTIPART_SLACK_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct HttpState {
    pub sessions: Arc<SessionStore>,
    pub accounts: AccountService,
    pub posts: PostService,
    pub maintenance: MaintenanceService,
    pub feed: Arc<FeedSnapshot>,
}

pub fn build_router(state: HttpState) -> Router {
    let upload_limit = state
        .posts
        .max_upload_bytes()
        .saturating_add(MULTIPART_SLACK_BYTES);

    Router::new()
        .route(
            "/",
            get(public::index)
                .post(public::upload)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/posts", get(public::older_posts))
        .route("/posts/{id}", get(public::post_detail))
        .route("/comment", post(public::comment))
        .route("/image/{file}", get(public::image))
        .route("/login", get(accounts::login_page).post(accounts::login))
        .route(
            "/register",
            get(accounts::register_page).post(accounts::register),
        )
        .route("/logout", get(accounts::logout))
        .route("/admin/banned", get(admin::banned_page).post(admin::ban))
        .route("/initialize", get(admin::initialize))
        .route("/{handle}", get(public::profile))
        .with_state(state)
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
}
