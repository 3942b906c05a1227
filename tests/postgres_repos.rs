//! Repository checks against a real Postgres.
//!
//! Set `DATABASE_URL` to a server where the test user may create databases
//! and run with `--ignored`.

use pixfeed::application::repos::{
    CommentsRepo, CreateCommentParams, CreatePostParams, CreateUserParams, MaintenanceRepo,
    PostsRepo, RepoError, UsersRepo,
};
use pixfeed::infra::db::PostgresRepositories;
use sqlx::PgPool;

async fn create_user(repos: &PostgresRepositories, name: &str) -> i32 {
    repos
        .create_user(CreateUserParams {
            account_name: name.to_string(),
            passhash: "digest".to_string(),
        })
        .await
        .expect("create user")
        .id
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn duplicate_account_name_is_reported(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    create_user(&repos, "alice").await;

    let err = repos
        .create_user(CreateUserParams {
            account_name: "alice".to_string(),
            passhash: "other".to_string(),
        })
        .await
        .expect_err("unique account name");
    assert!(matches!(err, RepoError::Duplicate { .. }));
    assert!(repos.account_name_exists("alice").await.expect("exists"));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn banned_authors_are_excluded_from_recent_posts(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let mary = create_user(&repos, "mary").await;
    let bob = create_user(&repos, "bob").await;

    for (user_id, body) in [(mary, "from mary"), (bob, "from bob")] {
        repos
            .create_post(CreatePostParams {
                user_id,
                mime: "image/png".to_string(),
                body: body.to_string(),
            })
            .await
            .expect("create post");
    }

    assert_eq!(repos.ban_users(&[bob]).await.expect("ban"), 1);

    let posts = repos.recent_posts(None, 10).await.expect("recent");
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].user_id, mary);
    assert!(
        repos
            .find_active_by_account_name("bob")
            .await
            .expect("lookup")
            .is_none()
    );
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn comments_carry_author_names_in_order(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let mary = create_user(&repos, "mary").await;
    let bob = create_user(&repos, "bob").await;
    let post = repos
        .create_post(CreatePostParams {
            user_id: mary,
            mime: "image/gif".to_string(),
            body: String::new(),
        })
        .await
        .expect("create post");

    for (user_id, text) in [(bob, "first"), (mary, "second")] {
        repos
            .create_comment(CreateCommentParams {
                post_id: post.id,
                user_id,
                comment: text.to_string(),
            })
            .await
            .expect("create comment");
    }

    let thread = repos.comments_for_post(post.id).await.expect("thread");
    let texts: Vec<_> = thread
        .iter()
        .map(|c| (c.author_name.as_str(), c.comment.as_str()))
        .collect();
    assert_eq!(texts, vec![("bob", "first"), ("mary", "second")]);
    assert_eq!(repos.count_by_user(bob).await.expect("count"), 1);
    assert_eq!(repos.count_on_posts(&[post.id]).await.expect("count"), 2);

    let missing = repos
        .create_comment(CreateCommentParams {
            post_id: post.id + 1000,
            user_id: bob,
            comment: "orphan".to_string(),
        })
        .await
        .expect_err("missing post");
    assert!(matches!(missing, RepoError::InvalidInput { .. }));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn reset_reapplies_seed_bans(pool: PgPool) {
    sqlx::query(
        "INSERT INTO users (id, account_name, passhash) \
         SELECT n, 'user' || n, 'digest' FROM generate_series(1, 100) AS n",
    )
    .execute(&pool)
    .await
    .expect("seed users");
    sqlx::query("UPDATE users SET del_flg = TRUE WHERE id = 7")
        .execute(&pool)
        .await
        .expect("ban 7");

    let repos = PostgresRepositories::new(pool);
    repos.reset().await.expect("reset");

    let mut banned: Vec<i32> = repos
        .list_users()
        .await
        .expect("users")
        .into_iter()
        .filter(|user| user.banned)
        .map(|user| user.id)
        .collect();
    banned.sort_unstable();
    assert_eq!(banned, vec![50, 100]);
}
