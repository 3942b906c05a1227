use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("account name `{0}` must be at least 3 characters of [0-9A-Za-z_]")]
    InvalidAccountName(String),
    #[error("password must be at least 6 characters of [0-9A-Za-z_]")]
    InvalidPassword,
    #[error("unsupported image content type `{content_type}`")]
    UnsupportedImage { content_type: String },
    #[error("domain entity `{entity}` not found")]
    NotFound { entity: &'static str },
}

impl DomainError {
    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }

    pub fn unsupported_image(content_type: impl Into<String>) -> Self {
        Self::UnsupportedImage {
            content_type: content_type.into(),
        }
    }
}
