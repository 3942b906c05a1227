//! Bearer-token session store.
//!
//! A session is looked up by the opaque token carried in the session cookie.
//! Lookups never allocate: an unknown or missing token simply yields an
//! anonymous session, and a token is only minted on the first `persist`.

use std::collections::HashMap;
use std::sync::Mutex;

use metrics::counter;
use rand::{RngCore, rngs::OsRng};
use thiserror::Error;
use tracing::{debug, error};

use super::lock::mutex_lock;

const SOURCE: &str = "cache::sessions";

/// Name of the cookie that transports the session token.
pub const SESSION_COOKIE: &str = "pixfeed_session";

/// Random bytes per session token before hex encoding.
const TOKEN_BYTES: usize = 16;
/// Random bytes per CSRF token before hex encoding.
const CSRF_TOKEN_BYTES: usize = 16;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("secure random source unavailable: {0}")]
    Entropy(#[from] rand::Error),
}

/// Per-client state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    token: Option<String>,
    pub user_id: Option<i32>,
    pub csrf_token: Option<String>,
    pub flash: Option<String>,
}

impl Session {
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    /// CSRF token to embed in forms, empty for anonymous sessions.
    pub fn csrf_token_or_empty(&self) -> &str {
        self.csrf_token.as_deref().unwrap_or("")
    }

    /// Attach an identity and a fresh CSRF token.
    pub fn sign_in(&mut self, user_id: i32) -> Result<(), TokenError> {
        self.user_id = Some(user_id);
        self.csrf_token = Some(random_hex(CSRF_TOKEN_BYTES)?);
        Ok(())
    }

    /// Clear the identity. The record itself stays in the store.
    pub fn sign_out(&mut self) {
        self.user_id = None;
        self.csrf_token = None;
    }

    pub fn set_flash(&mut self, message: impl Into<String>) {
        self.flash = Some(message.into());
    }
}

/// Process-wide session table guarded by a single mutex.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the session for `token`. Missing and unknown tokens resolve to
    /// a fresh anonymous session without touching the table.
    pub fn resolve(&self, token: Option<&str>) -> Session {
        let Some(token) = token.filter(|value| !value.is_empty()) else {
            return Session::default();
        };

        let sessions = mutex_lock(&self.sessions, SOURCE, "resolve");
        match sessions.get(token) {
            Some(session) => session.clone(),
            None => {
                debug!(target = SOURCE, "unknown session token treated as anonymous");
                Session::default()
            }
        }
    }

    /// Store the full session under its token, minting the token first if the
    /// session has none. Returns the token to set as the response cookie.
    ///
    /// Minting happens before the lock is taken; the write itself replaces
    /// the whole record so concurrent persists never merge fields.
    pub fn persist(&self, session: &mut Session) -> Result<String, TokenError> {
        let token = match session.token.clone() {
            Some(token) => token,
            None => {
                let token = random_hex(TOKEN_BYTES)?;
                counter!("pixfeed_session_minted_total").increment(1);
                session.token = Some(token.clone());
                token
            }
        };

        mutex_lock(&self.sessions, SOURCE, "persist").insert(token.clone(), session.clone());
        Ok(token)
    }

    /// Read and clear the flash message in one critical section, so a second
    /// read without an intervening set returns nothing. The caller's copy is
    /// cleared as well.
    pub fn consume_flash(&self, session: &mut Session) -> Option<String> {
        let local = session.flash.take();
        let Some(token) = session.token.as_deref() else {
            return local;
        };

        let mut sessions = mutex_lock(&self.sessions, SOURCE, "consume_flash");
        match sessions.get_mut(token) {
            Some(stored) => stored.flash.take(),
            None => local,
        }
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.sessions, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Hex-encoded bytes from the operating system CSPRNG. Failure is surfaced,
/// never papered over with a weaker source.
fn random_hex(len: usize) -> Result<String, TokenError> {
    let mut bytes = vec![0u8; len];
    OsRng.try_fill_bytes(&mut bytes).map_err(|err| {
        error!(target = SOURCE, error = %err, "secure random source failed");
        TokenError::from(err)
    })?;
    Ok(hex::encode(bytes))
}
