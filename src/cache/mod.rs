//! In-process caches shared by every request handler.
//!
//! - [`SessionStore`]: session token to per-client state.
//! - [`UserDirectory`]: user id to latest user record, bulk loaded.
//! - [`CommentIndex`]: post id to its comment thread, read-through.
//! - [`FeedSnapshot`]: pre-rendered landing-page fragment.
//!
//! Each store owns its lock(s); nothing outside a store touches its map.
//! Lock order: the feed refresh gate may be held while the directory or the
//! comment index is locked, never the other way round.

mod comments;
mod config;
mod feed;
mod lock;
mod sessions;
mod trigger;
mod users;

pub use comments::CommentIndex;
pub use config::CacheConfig;
pub use feed::{CSRF_PLACEHOLDER, FeedRenderError, FeedRenderer, FeedSnapshot, RefreshOutcome};
pub use sessions::{SESSION_COOKIE, Session, SessionStore, TokenError};
pub use trigger::FeedRefresher;
pub use users::UserDirectory;
