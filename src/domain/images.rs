//! Accepted image formats.

use crate::domain::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind {
    Jpeg,
    Png,
    Gif,
}

impl ImageKind {
    /// Classify an upload by its declared content type. Matching is by
    /// substring so `image/pjpeg` and `image/jpeg; charset=binary` both pass.
    pub fn from_content_type(content_type: &str) -> Result<Self, DomainError> {
        let lowered = content_type.to_ascii_lowercase();
        if lowered.contains("jpeg") {
            Ok(Self::Jpeg)
        } else if lowered.contains("png") {
            Ok(Self::Png)
        } else if lowered.contains("gif") {
            Ok(Self::Gif)
        } else {
            Err(DomainError::unsupported_image(content_type))
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "image/jpeg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/gif" => Some(Self::Gif),
            _ => None,
        }
    }

    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "jpg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            _ => None,
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
        }
    }
}
