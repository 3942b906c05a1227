use axum::{
    Form,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;

use crate::{
    application::{accounts::AccountError, error::AppError},
    cache::Session,
    presentation::views::{LoginTemplate, RegisterTemplate, Viewer, render_template_response},
};

use super::{HttpState, session};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct CredentialsForm {
    account_name: String,
    password: String,
}

pub(super) async fn login_page(State(state): State<HttpState>, jar: CookieJar) -> Response {
    let mut session = session::load(&state, &jar);
    if state.accounts.current_user(&session).await.is_some() {
        return Redirect::to("/").into_response();
    }

    let flash = state.sessions.consume_flash(&mut session);
    render_template_response(
        LoginTemplate {
            viewer: Viewer::default(),
            flash,
        },
        StatusCode::OK,
    )
}

pub(super) async fn login(
    State(state): State<HttpState>,
    jar: CookieJar,
    Form(form): Form<CredentialsForm>,
) -> Response {
    let mut session = session::load(&state, &jar);
    if state.accounts.current_user(&session).await.is_some() {
        return Redirect::to("/").into_response();
    }

    match state
        .accounts
        .login(&mut session, &form.account_name, &form.password)
        .await
    {
        Ok(_) => session::redirect_committed(&state, jar, session, "/"),
        Err(err) => rejection(&state, jar, session, err, "/login"),
    }
}

pub(super) async fn register_page(State(state): State<HttpState>, jar: CookieJar) -> Response {
    let mut session = session::load(&state, &jar);
    if state.accounts.current_user(&session).await.is_some() {
        return Redirect::to("/").into_response();
    }

    let flash = state.sessions.consume_flash(&mut session);
    render_template_response(
        RegisterTemplate {
            viewer: Viewer::default(),
            flash,
        },
        StatusCode::OK,
    )
}

pub(super) async fn register(
    State(state): State<HttpState>,
    jar: CookieJar,
    Form(form): Form<CredentialsForm>,
) -> Response {
    let mut session = session::load(&state, &jar);
    if state.accounts.current_user(&session).await.is_some() {
        return Redirect::to("/").into_response();
    }

    match state
        .accounts
        .register(&mut session, &form.account_name, &form.password)
        .await
    {
        Ok(_) => session::redirect_committed(&state, jar, session, "/"),
        Err(err) => rejection(&state, jar, session, err, "/register"),
    }
}

/// Signs the session out. A client that never had a session gets nothing
/// stored.
pub(super) async fn logout(State(state): State<HttpState>, jar: CookieJar) -> Response {
    let mut session = session::load(&state, &jar);
    if session.token().is_none() {
        return Redirect::to("/").into_response();
    }

    state.accounts.logout(&mut session);
    session::redirect_committed(&state, jar, session, "/")
}

fn rejection(
    state: &HttpState,
    jar: CookieJar,
    session: Session,
    err: AccountError,
    back_to: &str,
) -> Response {
    match err.flash() {
        Some(message) => session::redirect_with_flash(state, jar, session, message, back_to),
        None => AppError::from(err).into_response(),
    }
}
