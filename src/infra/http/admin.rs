use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::{CookieJar, Form};
use serde::Deserialize;
use tracing::info;

use crate::{
    application::error::HttpError,
    cache::Session,
    domain::entities::UserRecord,
    presentation::views::{BannableUserView, BannedTemplate, Viewer, render_template_response},
};

use super::{HttpState, session};

enum AdminGate {
    Allowed(UserRecord),
    Denied(Response),
}

async fn require_admin(state: &HttpState, session: &Session, source: &'static str) -> AdminGate {
    match state.accounts.current_user(session).await {
        None => AdminGate::Denied(Redirect::to("/login").into_response()),
        Some(user) if !user.is_admin() => {
            AdminGate::Denied(HttpError::forbidden(source).into_response())
        }
        Some(user) => AdminGate::Allowed(user),
    }
}

pub(super) async fn banned_page(State(state): State<HttpState>, jar: CookieJar) -> Response {
    const SOURCE: &str = "infra::http::admin::banned_page";

    let mut session = session::load(&state, &jar);
    let admin = match require_admin(&state, &session, SOURCE).await {
        AdminGate::Allowed(user) => user,
        AdminGate::Denied(response) => return response,
    };

    let users = match state.accounts.bannable_users().await {
        Ok(users) => users,
        Err(err) => return err.into_response(),
    };
    let flash = state.sessions.consume_flash(&mut session);

    render_template_response(
        BannedTemplate {
            viewer: Viewer::from_user(Some(&admin)),
            flash,
            csrf_token: session.csrf_token_or_empty().to_string(),
            users: users.iter().map(BannableUserView::from).collect(),
        },
        StatusCode::OK,
    )
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct BanForm {
    #[serde(default)]
    csrf_token: String,
    #[serde(rename = "uid[]", default)]
    uid: Vec<String>,
}

pub(super) async fn ban(
    State(state): State<HttpState>,
    jar: CookieJar,
    Form(form): Form<BanForm>,
) -> Response {
    const SOURCE: &str = "infra::http::admin::ban";

    let session = session::load(&state, &jar);
    let admin = match require_admin(&state, &session, SOURCE).await {
        AdminGate::Allowed(user) => user,
        AdminGate::Denied(response) => return response,
    };

    if let Err(err) = session::verify_csrf(SOURCE, &session, &form.csrf_token) {
        return err.into_response();
    }

    let ids = match form
        .uid
        .iter()
        .map(|raw| raw.trim().parse::<i32>())
        .collect::<Result<Vec<_>, _>>()
    {
        Ok(ids) => ids,
        Err(err) => {
            return HttpError::from_error(
                SOURCE,
                StatusCode::BAD_REQUEST,
                "uid[] must contain integers",
                &err,
            )
            .into_response();
        }
    };

    match state.accounts.ban(&ids).await {
        Ok(changed) => {
            info!(target = SOURCE, admin_id = admin.id, changed, "ban request applied");
            Redirect::to("/admin/banned").into_response()
        }
        Err(err) => err.into_response(),
    }
}

/// Benchmark reset hook.
pub(super) async fn initialize(State(state): State<HttpState>) -> Response {
    match state.maintenance.initialize().await {
        Ok(_) => StatusCode::OK.into_response(),
        Err(err) => err.into_response(),
    }
}
