//! Disk-based asset storage backend.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{AssetCategory, AssetStore, AssetUpload};
use crate::errors::AppError;

/// Stores assets as `{root}/{category}/{key}`; the router serves `root`
/// under the public base URL.
#[derive(Clone)]
pub struct DiskAssetStore {
    root: PathBuf,
    public_base_url: String,
}

impl DiskAssetStore {
    pub fn new(root: PathBuf, public_base_url: impl Into<String>) -> Self {
        Self {
            root,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Map a public URL back to a file under `root`.
    fn path_for_url(&self, url: &str) -> Result<PathBuf, AppError> {
        let relative = url
            .strip_prefix(&self.public_base_url)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| {
                AppError::Storage(format!("Asset URL {} is not served by this store", url))
            })?;

        let mut parts = relative.splitn(2, '/');
        let dir = parts.next().unwrap_or_default();
        let key = parts.next().unwrap_or_default();
        let category = AssetCategory::from_dir(dir).ok_or_else(|| {
            AppError::Storage(format!("Unknown asset category in {}", url))
        })?;

        let key_path = Path::new(key);
        let single_normal = key_path.components().count() == 1
            && matches!(key_path.components().next(), Some(Component::Normal(_)));
        if !single_normal {
            return Err(AppError::Storage(format!("Invalid asset key in {}", url)));
        }

        Ok(self.root.join(category.as_str()).join(key_path))
    }
}

#[async_trait]
impl AssetStore for DiskAssetStore {
    async fn put(
        &self,
        category: AssetCategory,
        key: &str,
        upload: &AssetUpload,
    ) -> Result<String, AppError> {
        let dir = self.root.join(category.as_str());
        fs::create_dir_all(&dir).await.map_err(|e| {
            AppError::Storage(format!("Failed to create asset directory: {}", e))
        })?;

        // Existing objects are never overwritten
        let write_err = |e: std::io::Error| {
            AppError::Storage(format!("Failed to write asset {}: {}", key, e))
        };
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dir.join(key))
            .await
            .map_err(write_err)?;
        file.write_all(&upload.bytes).await.map_err(write_err)?;
        file.flush().await.map_err(write_err)?;

        Ok(format!(
            "{}/{}/{}",
            self.public_base_url,
            category.as_str(),
            key
        ))
    }

    async fn delete(&self, url: &str) -> Result<(), AppError> {
        let path = self.path_for_url(url)?;

        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Storage(format!(
                "Failed to delete asset {}: {}",
                url, e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn upload(bytes: &[u8]) -> AssetUpload {
        AssetUpload {
            bytes: bytes.to_vec(),
            content_type: "image/png".to_string(),
            file_name: "logo.png".to_string(),
        }
    }

    #[tokio::test]
    async fn test_put_and_delete_asset() {
        let dir = tempdir().unwrap();
        let store = DiskAssetStore::new(dir.path().to_path_buf(), "http://localhost/assets/");

        let url = store
            .put(AssetCategory::Image, "1700000000000_logo.png", &upload(b"png"))
            .await
            .unwrap();
        assert_eq!(url, "http://localhost/assets/images/1700000000000_logo.png");

        let path = dir.path().join("images").join("1700000000000_logo.png");
        assert_eq!(std::fs::read(&path).unwrap(), b"png");

        store.delete(&url).await.unwrap();
        assert!(!path.exists());

        // Second delete is a no-op
        store.delete(&url).await.unwrap();
    }

    #[tokio::test]
    async fn test_put_refuses_to_overwrite_existing_key() {
        let dir = tempdir().unwrap();
        let store = DiskAssetStore::new(dir.path().to_path_buf(), "http://localhost/assets");
        store
            .put(AssetCategory::Image, "1_logo.png", &upload(b"first"))
            .await
            .unwrap();
        let err = store
            .put(AssetCategory::Image, "1_logo.png", &upload(b"second"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Storage(_)));
        let stored = std::fs::read(dir.path().join("images").join("1_logo.png")).unwrap();
        assert_eq!(stored, b"first");
    }

    #[tokio::test]
    async fn test_delete_rejects_foreign_urls() {
        let dir = tempdir().unwrap();
        let store = DiskAssetStore::new(dir.path().to_path_buf(), "http://localhost/assets");

        for url in [
            "http://elsewhere/assets/images/a.png",
            "http://localhost/assets/videos/a.mp4",
            "http://localhost/assets/images/../secret",
            "http://localhost/assets/images/",
        ] {
            let err = store.delete(url).await.unwrap_err();
            assert!(matches!(err, AppError::Storage(_)), "{}", url);
        }
    }
}
