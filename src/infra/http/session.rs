//! Session cookie plumbing shared by the handlers.

use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use subtle::ConstantTimeEq;

use crate::application::error::{AppError, HttpError};
use crate::cache::{SESSION_COOKIE, Session};

use super::HttpState;

/// The session named by the request cookie, or a fresh anonymous one.
pub(super) fn load(state: &HttpState, jar: &CookieJar) -> Session {
    let token = jar.get(SESSION_COOKIE).map(|cookie| cookie.value());
    state.sessions.resolve(token)
}

/// Persist `session` and make sure the response carries its cookie.
pub(super) fn commit(
    state: &HttpState,
    jar: CookieJar,
    session: &mut Session,
) -> Result<CookieJar, AppError> {
    let token = state.sessions.persist(session)?;
    let cookie = Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);
    Ok(jar.add(cookie))
}

/// Set a flash message, persist the session and redirect to `to`.
pub(super) fn redirect_with_flash(
    state: &HttpState,
    jar: CookieJar,
    mut session: Session,
    message: &str,
    to: &str,
) -> Response {
    session.set_flash(message);
    match commit(state, jar, &mut session) {
        Ok(jar) => (jar, Redirect::to(to)).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Redirect while persisting any change made to the session.
pub(super) fn redirect_committed(
    state: &HttpState,
    jar: CookieJar,
    mut session: Session,
    to: &str,
) -> Response {
    match commit(state, jar, &mut session) {
        Ok(jar) => (jar, Redirect::to(to)).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Compare the submitted token against the session's in constant time.
/// Sessions without a token never match.
pub(super) fn verify_csrf(
    source: &'static str,
    session: &Session,
    submitted: &str,
) -> Result<(), HttpError> {
    let Some(expected) = session.csrf_token.as_deref() else {
        return Err(HttpError::csrf_mismatch(source));
    };
    if expected.as_bytes().ct_eq(submitted.as_bytes()).into() {
        Ok(())
    } else {
        Err(HttpError::csrf_mismatch(source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn csrf_requires_an_exact_match() {
        let mut session = Session::default();
        session.sign_in(4).expect("token");
        let token = session.csrf_token.clone().expect("csrf");

        assert!(verify_csrf("test", &session, &token).is_ok());

        let err = verify_csrf("test", &session, "deadbeef").expect_err("mismatch");
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn anonymous_session_rejects_empty_token() {
        let session = Session::default();
        assert!(verify_csrf("test", &session, "").is_err());
    }
}
