use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode, header},
};
use http_body_util::BodyExt;
use pixfeed::{
    application::{
        accounts::{FLASH_ACCOUNT_TAKEN, FLASH_LOGIN_FAILED},
        posts::FLASH_IMAGE_TYPE,
    },
    cache::{CacheConfig, SESSION_COOKIE},
    domain::{
        accounts::password_digest,
        entities::{CommentRecord, PostRecord, UserRecord},
    },
    infra::{
        bootstrap::{Repositories, StateOptions, build_http_state},
        http::{HttpState, REQUEST_ID_HEADER, build_router},
        memory::MemoryRepositories,
    },
};
use tempfile::TempDir;
use time::{Duration, OffsetDateTime, macros::datetime};
use tower::ServiceExt;

const BOUNDARY: &str = "pixfeed-test-boundary";

struct TestApp {
    router: Router,
    state: HttpState,
    repo: Arc<MemoryRepositories>,
    _images: TempDir,
}

fn seeded_at(minutes: i64) -> OffsetDateTime {
    datetime!(2016-01-01 00:00:00 UTC) + Duration::minutes(minutes)
}

fn user(id: i32, name: &str, password: &str, authority: bool) -> UserRecord {
    UserRecord {
        id,
        account_name: name.to_string(),
        passhash: password_digest(name, password),
        authority,
        banned: false,
        created_at: seeded_at(i64::from(id)),
    }
}

/// root (admin, id 1), mary (id 2) owning posts 1..=10, bob (id 3) with two
/// comments on post 10.
async fn app() -> TestApp {
    let repo = Arc::new(MemoryRepositories::new());
    repo.seed_user(user(1, "root", "rootpass", true));
    repo.seed_user(user(2, "mary", "marypass", false));
    repo.seed_user(user(3, "bob", "bobpass", false));
    for id in 1..=10 {
        repo.seed_post(PostRecord {
            id,
            user_id: 2,
            mime: "image/jpeg".to_string(),
            body: format!("post body {id}"),
            created_at: seeded_at(100 + i64::from(id)),
        });
    }
    for (id, text) in [(1, "first from bob"), (2, "second from bob")] {
        repo.seed_comment(CommentRecord {
            id,
            post_id: 10,
            user_id: 3,
            author_name: "bob".to_string(),
            comment: text.to_string(),
            created_at: seeded_at(200 + i64::from(id)),
        });
    }

    let images = tempfile::tempdir().expect("tempdir");
    let options = StateOptions {
        cache: CacheConfig {
            refresh_settle_ms: 0,
            ..CacheConfig::default()
        },
        images_directory: images.path().to_path_buf(),
        max_upload_bytes: 1024,
    };
    let state = build_http_state(Repositories::shared(repo.clone()), &options)
        .await
        .expect("state");

    TestApp {
        router: build_router(state.clone()),
        state,
        repo,
        _images: images,
    }
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).expect("request"))
            .await
    }

    async fn post_form(&self, uri: &str, cookie: Option<&str>, body: &str) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body.to_string())).expect("request"))
            .await
    }

    /// Register or log in and return the session cookie pair.
    async fn sign_in(&self, path: &str, name: &str, password: &str) -> String {
        let response = self
            .post_form(
                path,
                None,
                &format!("account_name={name}&password={password}"),
            )
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");
        session_cookie(&response).expect("session cookie")
    }

    fn csrf_token(&self, cookie: &str) -> String {
        let token = cookie
            .strip_prefix(&format!("{SESSION_COOKIE}="))
            .expect("cookie pair");
        self.state
            .sessions
            .resolve(Some(token))
            .csrf_token
            .expect("signed-in session has a csrf token")
    }
}

fn session_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|value| value.starts_with(SESSION_COOKIE))
        .and_then(|value| value.split(';').next())
        .map(str::to_string)
}

fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes()
        .to_vec()
}

async fn body_text(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).expect("utf-8 body")
}

fn multipart_upload(cookie: &str, csrf: &str, content_type: &str, data: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"csrf_token\"\r\n\r\n{csrf}\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"body\"\r\n\r\nsunset\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"upload\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/")
        .header(header::COOKIE, cookie)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("request")
}

#[tokio::test]
async fn registration_signs_the_session_in() {
    let app = app().await;

    let cookie = app.sign_in("/register", "alice", "secret1").await;

    let alice = app.repo.user_by_name("alice").expect("alice stored");
    let token = cookie
        .strip_prefix(&format!("{SESSION_COOKIE}="))
        .expect("cookie pair");
    let session = app.state.sessions.resolve(Some(token));
    assert_eq!(session.user_id, Some(alice.id));

    let current = app.state.accounts.current_user(&session).await;
    assert_eq!(current.map(|user| user.id), Some(alice.id));

    let page = body_text(app.get("/", Some(&cookie)).await).await;
    assert!(page.contains("href=\"/@alice\""));
    assert!(page.contains(&session.csrf_token.expect("csrf")));
}

#[tokio::test]
async fn duplicate_registration_sets_a_flash() {
    let app = app().await;
    let first = app.sign_in("/register", "alice", "secret1").await;
    let alice = app.repo.user_by_name("alice").expect("alice stored");

    let response = app
        .post_form("/register", None, "account_name=alice&password=another1")
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/register");
    let second = session_cookie(&response).expect("flash needs a session");

    let page = body_text(app.get("/register", Some(&second)).await).await;
    assert!(page.contains(FLASH_ACCOUNT_TAKEN));

    let again = body_text(app.get("/register", Some(&second)).await).await;
    assert!(!again.contains(FLASH_ACCOUNT_TAKEN));

    assert_eq!(app.repo.user_by_name("alice"), Some(alice.clone()));
    let token = first
        .strip_prefix(&format!("{SESSION_COOKIE}="))
        .expect("cookie pair");
    let session = app.state.sessions.resolve(Some(token));
    assert_eq!(
        app.state.accounts.current_user(&session).await,
        Some(alice)
    );
}

#[tokio::test]
async fn wrong_password_is_rejected_with_a_flash() {
    let app = app().await;

    let response = app
        .post_form("/login", None, "account_name=mary&password=nope123")
        .await;
    assert_eq!(location(&response), "/login");
    let cookie = session_cookie(&response).expect("session cookie");

    let page = body_text(app.get("/login", Some(&cookie)).await).await;
    assert!(page.contains(FLASH_LOGIN_FAILED));
}

#[tokio::test]
async fn comment_is_appended_after_existing_thread() {
    let app = app().await;
    let cookie = app.sign_in("/register", "alice", "secret1").await;
    let csrf = app.csrf_token(&cookie);

    let response = app
        .post_form(
            "/comment",
            Some(&cookie),
            &format!("post_id=10&comment=hello+from+alice&csrf_token={csrf}"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/posts/10");
    assert_eq!(app.repo.comment_rows(10), 3);

    let page = body_text(app.get("/posts/10", Some(&cookie)).await).await;
    let first = page.find("first from bob").expect("first comment");
    let second = page.find("second from bob").expect("second comment");
    let mine = page.find("hello from alice").expect("new comment");
    assert!(first < second && second < mine);
    assert!(page.contains("<b>3</b>"));
}

#[tokio::test]
async fn first_comment_on_an_unread_thread_shows_once() {
    let app = app().await;
    app.repo.seed_post(PostRecord {
        id: 11,
        user_id: 2,
        mime: "image/jpeg".to_string(),
        body: "post body 11".to_string(),
        created_at: seeded_at(50),
    });
    let cookie = app.sign_in("/register", "alice", "secret1").await;
    let csrf = app.csrf_token(&cookie);

    let response = app
        .post_form(
            "/comment",
            Some(&cookie),
            &format!("post_id=11&comment=cold+thread+hello&csrf_token={csrf}"),
        )
        .await;
    assert_eq!(location(&response), "/posts/11");
    assert_eq!(app.repo.comment_rows(11), 1);

    let page = body_text(app.get("/posts/11", Some(&cookie)).await).await;
    assert_eq!(page.matches("cold thread hello").count(), 1);
    assert!(page.contains("<b>1</b>"));
}

#[tokio::test]
async fn csrf_mismatch_is_unprocessable() {
    let app = app().await;
    let cookie = app.sign_in("/register", "alice", "secret1").await;

    let response = app
        .post_form(
            "/comment",
            Some(&cookie),
            "post_id=10&comment=sneaky&csrf_token=deadbeef",
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    assert_eq!(app.repo.comment_rows(10), 2);
}

#[tokio::test]
async fn anonymous_comment_redirects_to_login() {
    let app = app().await;

    let response = app
        .post_form("/comment", None, "post_id=10&comment=hi&csrf_token=")
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
    assert_eq!(app.repo.comment_rows(10), 2);
}

#[tokio::test]
async fn admin_ban_removes_posts_from_the_feed() {
    let app = app().await;

    let mary = app.sign_in("/login", "mary", "marypass").await;
    let forbidden = app.get("/admin/banned", Some(&mary)).await;
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let before = body_text(app.get("/", None).await).await;
    assert!(before.contains("id=\"pid_10\""));

    let root = app.sign_in("/login", "root", "rootpass").await;
    let listing = body_text(app.get("/admin/banned", Some(&root)).await).await;
    assert!(listing.contains("data-account-name=\"mary\""));
    assert!(!listing.contains("data-account-name=\"root\""));

    let csrf = app.csrf_token(&root);
    let response = app
        .post_form(
            "/admin/banned",
            Some(&root),
            &format!("uid%5B%5D=2&csrf_token={csrf}"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/admin/banned");

    let after = body_text(app.get("/", None).await).await;
    assert!(!after.contains("id=\"pid_10\""));
    assert!(app.repo.user_by_name("mary").expect("mary").banned);
}

#[tokio::test]
async fn older_posts_cursor_handling() {
    let app = app().await;

    let missing = app.get("/posts", None).await;
    assert_eq!(missing.status(), StatusCode::OK);
    assert!(body_text(missing).await.is_empty());

    let invalid = app.get("/posts?max_created_at=yesterday", None).await;
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

    let too_old = app
        .get("/posts?max_created_at=2015-01-01T00:00:00Z", None)
        .await;
    assert_eq!(too_old.status(), StatusCode::NOT_FOUND);

    // Posts 1..=5 were created at minutes 101..=105.
    let page = body_text(
        app.get("/posts?max_created_at=2016-01-01T01:45:00Z", None)
            .await,
    )
    .await;
    assert!(page.contains("id=\"pid_5\""));
    assert!(!page.contains("id=\"pid_6\""));
}

#[tokio::test]
async fn profile_requires_the_at_prefix() {
    let app = app().await;

    let page = app.get("/@mary", None).await;
    assert_eq!(page.status(), StatusCode::OK);
    let html = body_text(page).await;
    assert!(html.contains("<span class=\"isu-post-count\">10</span>"));

    assert_eq!(app.get("/mary", None).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.get("/@nobody", None).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn upload_stores_the_image_and_serves_it() {
    let app = app().await;
    let cookie = app.sign_in("/register", "alice", "secret1").await;
    let csrf = app.csrf_token(&cookie);
    let png = b"\x89PNG\r\n\x1a\nfake";

    let response = app
        .send(multipart_upload(&cookie, &csrf, "image/png", png))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/posts/11");

    let image = app.get("/image/11.png", None).await;
    assert_eq!(image.status(), StatusCode::OK);
    assert_eq!(
        image.headers().get(header::CONTENT_TYPE).expect("type"),
        "image/png"
    );
    assert_eq!(body_bytes(image).await, png.to_vec());

    assert_eq!(
        app.get("/image/11.jpg", None).await.status(),
        StatusCode::NOT_FOUND
    );

    let feed = body_text(app.get("/", None).await).await;
    assert!(feed.contains("id=\"pid_11\""));
}

#[tokio::test]
async fn upload_of_unsupported_type_sets_a_flash() {
    let app = app().await;
    let cookie = app.sign_in("/register", "alice", "secret1").await;
    let csrf = app.csrf_token(&cookie);

    let response = app
        .send(multipart_upload(&cookie, &csrf, "text/plain", b"hello"))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");

    let page = body_text(app.get("/", Some(&cookie)).await).await;
    assert!(page.contains(FLASH_IMAGE_TYPE));
}
