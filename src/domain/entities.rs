//! Domain entities mirrored from persistent storage.

use time::OffsetDateTime;

use crate::domain::images::ImageKind;

/// A registered account. Bans are soft: the row and the cached copy stay,
/// only `banned` flips.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: i32,
    pub account_name: String,
    pub passhash: String,
    pub authority: bool,
    pub banned: bool,
    pub created_at: OffsetDateTime,
}

impl UserRecord {
    pub fn is_admin(&self) -> bool {
        self.authority
    }
}

/// Post metadata. Image bytes live on the filesystem, never in this record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRecord {
    pub id: i32,
    pub user_id: i32,
    pub mime: String,
    pub body: String,
    pub created_at: OffsetDateTime,
}

impl PostRecord {
    pub fn image_kind(&self) -> Option<ImageKind> {
        ImageKind::from_mime(&self.mime)
    }

    /// Public URL of the post image, e.g. `/image/42.png`.
    pub fn image_url(&self) -> String {
        match self.image_kind() {
            Some(kind) => format!("/image/{}.{}", self.id, kind.extension()),
            None => format!("/image/{}", self.id),
        }
    }
}

/// A comment joined with its author's account name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentRecord {
    pub id: i32,
    pub post_id: i32,
    pub user_id: i32,
    pub author_name: String,
    pub comment: String,
    pub created_at: OffsetDateTime,
}
