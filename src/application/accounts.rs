//! Registration, login and moderation.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::application::error::AppError;
use crate::application::repos::{CreateUserParams, RepoError, UsersRepo};
use crate::cache::{FeedRefresher, Session, TokenError, UserDirectory};
use crate::domain::accounts::{password_digest, validate_credentials};
use crate::domain::entities::UserRecord;

const SOURCE: &str = "application::accounts";

pub const FLASH_INVALID_CREDENTIALS: &str =
    "account name must be at least 3 characters and password at least 6";
pub const FLASH_ACCOUNT_TAKEN: &str = "account name is already taken";
pub const FLASH_LOGIN_FAILED: &str = "incorrect account name or password";

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("credentials failed validation")]
    InvalidCredentials,
    #[error("account name is already taken")]
    AccountNameTaken,
    #[error("login rejected")]
    LoginFailed,
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Token(#[from] TokenError),
}

impl AccountError {
    /// Notice shown to the user on the next page, for rejections the user
    /// can correct.
    pub fn flash(&self) -> Option<&'static str> {
        match self {
            AccountError::InvalidCredentials => Some(FLASH_INVALID_CREDENTIALS),
            AccountError::AccountNameTaken => Some(FLASH_ACCOUNT_TAKEN),
            AccountError::LoginFailed => Some(FLASH_LOGIN_FAILED),
            AccountError::Repo(_) | AccountError::Token(_) => None,
        }
    }
}

impl From<AccountError> for AppError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::Repo(err) => AppError::Repo(err),
            AccountError::Token(err) => AppError::Token(err),
            other => AppError::validation(other.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UsersRepo>,
    directory: Arc<UserDirectory>,
    refresher: Arc<FeedRefresher>,
}

impl AccountService {
    pub fn new(
        users: Arc<dyn UsersRepo>,
        directory: Arc<UserDirectory>,
        refresher: Arc<FeedRefresher>,
    ) -> Self {
        Self {
            users,
            directory,
            refresher,
        }
    }

    /// The signed-in user, resolved through the directory. Banned or unknown
    /// users count as signed out.
    pub async fn current_user(&self, session: &Session) -> Option<UserRecord> {
        let user_id = session.user_id?;
        self.directory
            .get(user_id)
            .await
            .filter(|user| !user.banned)
    }

    /// Create the account and sign the session in as it.
    ///
    /// The directory is only updated after the insert has committed, with
    /// the id storage assigned.
    pub async fn register(
        &self,
        session: &mut Session,
        account_name: &str,
        password: &str,
    ) -> Result<UserRecord, AccountError> {
        validate_credentials(account_name, password)
            .map_err(|_| AccountError::InvalidCredentials)?;

        if self.users.account_name_exists(account_name).await? {
            return Err(AccountError::AccountNameTaken);
        }

        let params = CreateUserParams {
            account_name: account_name.to_string(),
            passhash: password_digest(account_name, password),
        };
        let user = match self.users.create_user(params).await {
            Ok(user) => user,
            Err(RepoError::Duplicate { .. }) => return Err(AccountError::AccountNameTaken),
            Err(err) => return Err(err.into()),
        };

        self.directory.upsert(user.clone()).await;
        session.sign_in(user.id)?;
        info!(
            target = SOURCE,
            user_id = user.id,
            account_name = %user.account_name,
            "account registered"
        );
        Ok(user)
    }

    pub async fn login(
        &self,
        session: &mut Session,
        account_name: &str,
        password: &str,
    ) -> Result<UserRecord, AccountError> {
        let Some(user) = self.users.find_active_by_account_name(account_name).await? else {
            return Err(AccountError::LoginFailed);
        };

        if password_digest(&user.account_name, password) != user.passhash {
            warn!(target = SOURCE, user_id = user.id, "password mismatch");
            return Err(AccountError::LoginFailed);
        }

        session.sign_in(user.id)?;
        Ok(user)
    }

    pub fn logout(&self, session: &mut Session) {
        session.sign_out();
    }

    /// Unbanned non-admin users, newest first.
    pub async fn bannable_users(&self) -> Result<Vec<UserRecord>, AppError> {
        Ok(self.users.list_bannable_users().await?)
    }

    /// Ban `ids` in storage, mirror the flags into the directory, then
    /// refresh the feed.
    pub async fn ban(&self, ids: &[i32]) -> Result<u64, AppError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let changed = self.users.ban_users(ids).await?;
        for id in ids {
            self.directory.set_banned(*id, true).await;
        }
        info!(target = SOURCE, requested = ids.len(), changed, "users banned");

        self.refresher.after_write().await;
        Ok(changed)
    }
}
