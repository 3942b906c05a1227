use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

use crate::application::error::HttpError;
use crate::application::timeline::TimelinePost;
use crate::cache::{FeedRenderError, FeedRenderer};
use crate::domain::entities::UserRecord;

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Who is looking at the page, as far as the header navigation cares.
#[derive(Debug, Clone, Default)]
pub struct Viewer {
    pub signed_in: bool,
    pub account_name: String,
    pub is_admin: bool,
}

impl Viewer {
    pub fn from_user(user: Option<&UserRecord>) -> Self {
        match user {
            Some(user) => Self {
                signed_in: true,
                account_name: user.account_name.clone(),
                is_admin: user.is_admin(),
            },
            None => Self::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommentView {
    pub account_name: String,
    pub comment: String,
}

#[derive(Debug, Clone)]
pub struct PostView {
    pub id: i32,
    pub account_name: String,
    pub image_url: String,
    pub body: String,
    pub created_at: String,
    pub comment_count: usize,
    pub comments: Vec<CommentView>,
    pub csrf_token: String,
}

impl From<&TimelinePost> for PostView {
    fn from(post: &TimelinePost) -> Self {
        Self {
            id: post.post.id,
            account_name: post.author.account_name.clone(),
            image_url: post.image_url(),
            body: post.post.body.clone(),
            created_at: post.created_at_rfc3339(),
            comment_count: post.comment_count,
            comments: post
                .comments
                .iter()
                .map(|comment| CommentView {
                    account_name: comment.author_name.clone(),
                    comment: comment.comment.clone(),
                })
                .collect(),
            csrf_token: post.csrf_token.clone(),
        }
    }
}

pub fn post_views(posts: &[TimelinePost]) -> Vec<PostView> {
    posts.iter().map(PostView::from).collect()
}

#[derive(Debug, Clone)]
pub struct BannableUserView {
    pub id: i32,
    pub account_name: String,
}

impl From<&UserRecord> for BannableUserView {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id,
            account_name: user.account_name.clone(),
        }
    }
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub viewer: Viewer,
    pub flash: Option<String>,
    pub csrf_token: String,
    /// Pre-rendered feed fragment, inserted unescaped.
    pub feed: String,
}

#[derive(Template)]
#[template(path = "posts.html")]
pub struct PostsFragmentTemplate {
    pub posts: Vec<PostView>,
}

#[derive(Template)]
#[template(path = "post_detail.html")]
pub struct PostDetailTemplate {
    pub viewer: Viewer,
    pub flash: Option<String>,
    pub post: PostView,
}

#[derive(Template)]
#[template(path = "user.html")]
pub struct UserTemplate {
    pub viewer: Viewer,
    pub flash: Option<String>,
    pub user_name: String,
    pub post_count: usize,
    pub comment_count: i64,
    pub commented_count: i64,
    pub posts: Vec<PostView>,
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub viewer: Viewer,
    pub flash: Option<String>,
}

#[derive(Template)]
#[template(path = "register.html")]
pub struct RegisterTemplate {
    pub viewer: Viewer,
    pub flash: Option<String>,
}

#[derive(Template)]
#[template(path = "banned.html")]
pub struct BannedTemplate {
    pub viewer: Viewer,
    pub flash: Option<String>,
    pub csrf_token: String,
    pub users: Vec<BannableUserView>,
}

/// Renders the landing-page feed fragment through [`PostsFragmentTemplate`].
#[derive(Debug, Default, Clone, Copy)]
pub struct AskamaFeedRenderer;

impl FeedRenderer for AskamaFeedRenderer {
    fn render_posts(&self, posts: &[TimelinePost]) -> Result<String, FeedRenderError> {
        PostsFragmentTemplate {
            posts: post_views(posts),
        }
        .render()
        .map_err(|err| FeedRenderError(err.to_string()))
    }
}
