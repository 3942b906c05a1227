use axum::{
    Form,
    body::Body,
    extract::{Path, Query, State},
    http::{
        HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::{
    CookieJar, Multipart,
    multipart::MultipartError,
};
use bytes::Bytes;
use serde::Deserialize;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::{
    application::{
        error::{AppError, HttpError},
        posts::{FLASH_IMAGE_TOO_LARGE, ImageUpload},
    },
    domain::images::ImageKind,
    presentation::views::{
        IndexTemplate, PostDetailTemplate, PostView, PostsFragmentTemplate, UserTemplate, Viewer,
        post_views, render_template_response,
    },
};

use super::{HttpState, session};

pub(super) async fn index(State(state): State<HttpState>, jar: CookieJar) -> Response {
    let mut session = session::load(&state, &jar);
    let user = state.accounts.current_user(&session).await;
    let flash = state.sessions.consume_flash(&mut session);
    let csrf_token = session.csrf_token_or_empty().to_string();
    let feed = state.feed.render(&csrf_token);

    render_template_response(
        IndexTemplate {
            viewer: Viewer::from_user(user.as_ref()),
            flash,
            csrf_token,
            feed,
        },
        StatusCode::OK,
    )
}

#[derive(Debug, Default)]
struct UploadForm {
    csrf_token: String,
    body: String,
    image: Option<ImageUpload>,
}

async fn read_upload_form(multipart: &mut Multipart) -> Result<UploadForm, MultipartError> {
    let mut form = UploadForm::default();
    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("csrf_token") => form.csrf_token = field.text().await?,
            Some("body") => form.body = field.text().await?,
            Some("file") => {
                let content_type = field
                    .content_type()
                    .map(|mime| mime.to_string())
                    .unwrap_or_default();
                let data = field.bytes().await?;
                form.image = Some(ImageUpload { content_type, data });
            }
            _ => {}
        }
    }
    Ok(form)
}

pub(super) async fn upload(
    State(state): State<HttpState>,
    jar: CookieJar,
    mut multipart: Multipart,
) -> Response {
    const SOURCE: &str = "infra::http::public::upload";

    let session = session::load(&state, &jar);
    let Some(user) = state.accounts.current_user(&session).await else {
        return Redirect::to("/login").into_response();
    };

    let form = match read_upload_form(&mut multipart).await {
        Ok(form) => form,
        Err(err) if err.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            return session::redirect_with_flash(&state, jar, session, FLASH_IMAGE_TOO_LARGE, "/");
        }
        Err(err) => {
            return HttpError::from_error(
                SOURCE,
                StatusCode::BAD_REQUEST,
                "Invalid upload form",
                &err,
            )
            .into_response();
        }
    };

    if let Err(err) = session::verify_csrf(SOURCE, &session, &form.csrf_token) {
        return err.into_response();
    }

    match state.posts.create_post(user.id, form.image, form.body).await {
        Ok(post) => Redirect::to(&format!("/posts/{}", post.id)).into_response(),
        Err(err) => match err.flash() {
            Some(message) => session::redirect_with_flash(&state, jar, session, message, "/"),
            None => AppError::from(err).into_response(),
        },
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct OlderPostsQuery {
    max_created_at: Option<String>,
}

/// Next page of the feed for infinite scrolling. A request without a cursor
/// gets an empty 200.
pub(super) async fn older_posts(
    State(state): State<HttpState>,
    jar: CookieJar,
    Query(query): Query<OlderPostsQuery>,
) -> Response {
    const SOURCE: &str = "infra::http::public::older_posts";

    let Some(raw) = query
        .max_created_at
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    else {
        return StatusCode::OK.into_response();
    };

    let max_created_at = match OffsetDateTime::parse(raw, &Rfc3339) {
        Ok(value) => value,
        Err(err) => {
            return HttpError::from_error(
                SOURCE,
                StatusCode::BAD_REQUEST,
                "Invalid max_created_at",
                &err,
            )
            .into_response();
        }
    };

    let session = session::load(&state, &jar);
    match state
        .posts
        .older_posts(max_created_at, session.csrf_token_or_empty())
        .await
    {
        Ok(posts) if posts.is_empty() => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "No posts",
            "no posts at or before the cursor",
        )
        .into_response(),
        Ok(posts) => render_template_response(
            PostsFragmentTemplate {
                posts: post_views(&posts),
            },
            StatusCode::OK,
        ),
        Err(err) => err.into_response(),
    }
}

pub(super) async fn post_detail(
    State(state): State<HttpState>,
    jar: CookieJar,
    Path(id): Path<String>,
) -> Response {
    let Ok(id) = id.parse::<i32>() else {
        return AppError::NotFound.into_response();
    };

    let mut session = session::load(&state, &jar);
    let user = state.accounts.current_user(&session).await;
    let post = match state
        .posts
        .post_detail(id, session.csrf_token_or_empty())
        .await
    {
        Ok(post) => post,
        Err(err) => return err.into_response(),
    };
    let flash = state.sessions.consume_flash(&mut session);

    render_template_response(
        PostDetailTemplate {
            viewer: Viewer::from_user(user.as_ref()),
            flash,
            post: PostView::from(&post),
        },
        StatusCode::OK,
    )
}

/// `/@<account_name>`; any other single-segment path is not found.
pub(super) async fn profile(
    State(state): State<HttpState>,
    jar: CookieJar,
    Path(handle): Path<String>,
) -> Response {
    let Some(account_name) = handle.strip_prefix('@').filter(|name| !name.is_empty()) else {
        return AppError::NotFound.into_response();
    };

    let session = session::load(&state, &jar);
    let viewer = state.accounts.current_user(&session).await;
    match state
        .posts
        .profile(account_name, session.csrf_token_or_empty())
        .await
    {
        Ok(profile) => render_template_response(
            UserTemplate {
                viewer: Viewer::from_user(viewer.as_ref()),
                flash: None,
                user_name: profile.user.account_name.clone(),
                post_count: profile.post_count,
                comment_count: profile.comment_count,
                commented_count: profile.commented_count,
                posts: post_views(&profile.posts),
            },
            StatusCode::OK,
        ),
        Err(err) => err.into_response(),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct CommentForm {
    post_id: String,
    comment: String,
    csrf_token: String,
}

pub(super) async fn comment(
    State(state): State<HttpState>,
    jar: CookieJar,
    Form(form): Form<CommentForm>,
) -> Response {
    const SOURCE: &str = "infra::http::public::comment";

    let session = session::load(&state, &jar);
    let Some(user) = state.accounts.current_user(&session).await else {
        return Redirect::to("/login").into_response();
    };

    if let Err(err) = session::verify_csrf(SOURCE, &session, &form.csrf_token) {
        return err.into_response();
    }

    let Ok(post_id) = form.post_id.trim().parse::<i32>() else {
        return HttpError::new(
            SOURCE,
            StatusCode::BAD_REQUEST,
            "post_id must be an integer",
            format!("rejected post_id `{}`", form.post_id),
        )
        .into_response();
    };

    match state.posts.add_comment(user.id, post_id, form.comment).await {
        Ok(_) => Redirect::to(&format!("/posts/{post_id}")).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(super) async fn image(State(state): State<HttpState>, Path(file): Path<String>) -> Response {
    match state.posts.image(&file).await {
        Ok((kind, bytes)) => build_image_response(kind, bytes),
        Err(err) => err.into_response(),
    }
}

fn build_image_response(kind: ImageKind, bytes: Bytes) -> Response {
    let length = bytes.len();
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(kind.mime()));
    if let Ok(value) = HeaderValue::from_str(&length.to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );

    response
}
