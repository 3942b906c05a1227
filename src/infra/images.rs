//! Filesystem image storage.
//!
//! Images live flat under one directory as `<post id>.<ext>`. Post rows only
//! carry the MIME type; the bytes are written here after the row commits.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};
use tracing::debug;

use crate::domain::images::ImageKind;

const SOURCE: &str = "infra::images";

#[derive(Debug, Error)]
pub enum ImageStoreError {
    #[error("invalid image file name `{0}`")]
    InvalidName(String),
    #[error("image not found")]
    NotFound,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A parsed `<post id>.<ext>` file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageName {
    pub post_id: i32,
    pub kind: ImageKind,
}

impl ImageName {
    pub fn parse(file_name: &str) -> Result<Self, ImageStoreError> {
        let invalid = || ImageStoreError::InvalidName(file_name.to_string());
        let (stem, extension) = file_name.rsplit_once('.').ok_or_else(invalid)?;
        if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let post_id = stem.parse::<i32>().map_err(|_| invalid())?;
        let kind = ImageKind::from_extension(extension).ok_or_else(invalid)?;
        Ok(Self { post_id, kind })
    }

    pub fn file_name(&self) -> String {
        format!("{}.{}", self.post_id, self.kind.extension())
    }
}

#[derive(Debug)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write the image for `post_id`, replacing any previous file.
    ///
    /// Bytes go to a temporary sibling first and are renamed into place, so a
    /// concurrent reader never sees a partial image.
    pub async fn store(
        &self,
        post_id: i32,
        kind: ImageKind,
        data: &Bytes,
    ) -> Result<PathBuf, ImageStoreError> {
        let name = ImageName { post_id, kind };
        let target = self.root.join(name.file_name());
        let staging = self.root.join(format!(".{}.tmp", name.file_name()));

        let mut file = fs::File::create(&staging).await?;
        if let Err(err) = file.write_all(data).await {
            drop(file);
            let _ = fs::remove_file(&staging).await;
            return Err(err.into());
        }
        file.flush().await?;
        drop(file);

        fs::rename(&staging, &target).await?;
        debug!(
            target = SOURCE,
            post_id,
            bytes = data.len(),
            "image stored"
        );
        Ok(target)
    }

    pub async fn read(&self, name: ImageName) -> Result<Bytes, ImageStoreError> {
        let path = self.root.join(name.file_name());
        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(ImageStoreError::NotFound)
            }
            Err(err) => Err(ImageStoreError::Io(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parses_post_image_names() {
        assert_eq!(
            ImageName::parse("42.png").expect("valid"),
            ImageName {
                post_id: 42,
                kind: ImageKind::Png
            }
        );
        assert!(ImageName::parse("42").is_err());
        assert!(ImageName::parse("../42.png").is_err());
        assert!(ImageName::parse("42.bmp").is_err());
        assert!(ImageName::parse("-1.jpg").is_err());
    }

    #[tokio::test]
    async fn store_then_read() {
        let dir = tempdir().expect("tempdir");
        let store = ImageStore::new(dir.path().join("image")).expect("store");
        let data = Bytes::from_static(b"\x89PNG fake");

        let path = store.store(7, ImageKind::Png, &data).await.expect("store");
        assert!(path.ends_with("7.png"));

        let name = ImageName::parse("7.png").expect("name");
        assert_eq!(store.read(name).await.expect("read"), data);
    }

    #[tokio::test]
    async fn missing_image_is_not_found() {
        let dir = tempdir().expect("tempdir");
        let store = ImageStore::new(dir.path().to_path_buf()).expect("store");
        let name = ImageName::parse("1.gif").expect("name");
        assert!(matches!(
            store.read(name).await,
            Err(ImageStoreError::NotFound)
        ));
    }
}
