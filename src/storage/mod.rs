//! Storage gateway.
//!
//! Every row statement and every asset call made by the catalog passes through
//! [`StorageGateway`], which bounds it with the configured timeout and maps
//! backend failures into [`AppError`]. Binary assets live behind the
//! [`AssetStore`] trait so the backend can be swapped or stubbed.

pub mod disk;
pub mod remote;

pub use disk::DiskAssetStore;
pub use remote::HttpAssetStore;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::errors::AppError;
use crate::models::RevisionInfo;

/// Logical bucket an asset is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetCategory {
    Image,
    Archive,
}

impl AssetCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetCategory::Image => "images",
            AssetCategory::Archive => "archives",
        }
    }

    pub fn from_dir(dir: &str) -> Option<Self> {
        match dir {
            "images" => Some(AssetCategory::Image),
            "archives" => Some(AssetCategory::Archive),
            _ => None,
        }
    }
}

/// A file received from the owner, not yet stored.
#[derive(Debug, Clone)]
pub struct AssetUpload {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub file_name: String,
}

impl AssetUpload {
    /// Reject content that does not belong in the given bucket.
    pub fn check_category(&self, category: AssetCategory) -> Result<(), AppError> {
        if self.bytes.is_empty() {
            return Err(AppError::Validation(format!(
                "Uploaded {} file '{}' is empty",
                category.as_str(),
                self.file_name
            )));
        }
        let content_type = self.content_type.to_ascii_lowercase();
        let accepted = match category {
            AssetCategory::Image => content_type.starts_with("image/"),
            AssetCategory::Archive => {
                matches!(
                    content_type.as_str(),
                    "application/zip" | "application/x-zip-compressed"
                ) || (content_type == "application/octet-stream"
                    && self.file_name.to_ascii_lowercase().ends_with(".zip"))
            }
        };
        if accepted {
            Ok(())
        } else {
            Err(AppError::Validation(format!(
                "Content type '{}' is not accepted for {}",
                self.content_type,
                category.as_str()
            )))
        }
    }
}

/// Asset storage backend.
///
/// `put` stores the bytes under `key` inside `category` and returns the public
/// URL. `delete` takes a URL previously returned by `put`; deleting an absent
/// object succeeds.
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn put(
        &self,
        category: AssetCategory,
        key: &str,
        upload: &AssetUpload,
    ) -> Result<String, AppError>;

    async fn delete(&self, url: &str) -> Result<(), AppError>;
}

/// Build the object key `{timestamp}_{nonce}_{sanitized name}`.
///
/// The nonce keeps two uploads of the same name in the same millisecond apart.
pub fn asset_key(file_name: &str, timestamp_millis: i64, nonce: &str) -> String {
    format!(
        "{}_{}_{}",
        timestamp_millis,
        nonce,
        sanitize_file_name(file_name)
    )
}

/// Keep `[A-Za-z0-9._-]`, drop any directory part, never return an empty or dot-only name.
pub fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.chars().all(|c| c == '.') {
        "file".to_string()
    } else {
        cleaned
    }
}

/// Row collections owned by the catalog. Votes and comments cascade with
/// their bot and are never deleted on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Bots,
}

impl Collection {
    fn table(&self) -> &'static str {
        match self {
            Collection::Bots => "bots",
        }
    }

    fn key_column(&self) -> &'static str {
        match self {
            Collection::Bots => "bot_id",
        }
    }
}

/// Uniform access to rows and assets.
pub struct StorageGateway {
    pool: SqlitePool,
    assets: Arc<dyn AssetStore>,
    timeout: Duration,
}

impl StorageGateway {
    pub fn new(pool: SqlitePool, assets: Arc<dyn AssetStore>, timeout: Duration) -> Self {
        Self {
            pool,
            assets,
            timeout,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run a database future under the storage timeout.
    pub async fn run<T, F>(&self, op: &str, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(AppError::from),
            Err(_) => {
                tracing::error!(op, timeout = ?self.timeout, "Database call timed out");
                Err(AppError::Timeout(format!(
                    "{} did not complete within {:?}",
                    op, self.timeout
                )))
            }
        }
    }

    /// Delete a row by key. Absent rows are not an error.
    pub async fn delete_row(&self, collection: Collection, key: &str) -> Result<(), AppError> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?",
            collection.table(),
            collection.key_column()
        );
        let result = self
            .run(
                "delete_row",
                sqlx::query(&sql).bind(key).execute(&self.pool),
            )
            .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(table = collection.table(), key, "delete_row: already absent");
        }
        Ok(())
    }

    /// Get the current revision ID.
    pub async fn current_revision(&self) -> Result<i64, AppError> {
        let row = self
            .run(
                "current_revision",
                sqlx::query("SELECT revision_id FROM meta WHERE id = 1").fetch_one(&self.pool),
            )
            .await?;
        Ok(row.get("revision_id"))
    }

    /// Get revision info.
    pub async fn revision_info(&self) -> Result<RevisionInfo, AppError> {
        let row = self
            .run(
                "revision_info",
                sqlx::query("SELECT revision_id, generated_at FROM meta WHERE id = 1")
                    .fetch_one(&self.pool),
            )
            .await?;
        Ok(RevisionInfo {
            revision_id: row.get("revision_id"),
            generated_at: row.get("generated_at"),
        })
    }

    /// Increment the revision ID and return the new value.
    pub async fn bump_revision(&self) -> Result<i64, AppError> {
        let now = Utc::now().to_rfc3339();
        let row = self
            .run(
                "bump_revision",
                sqlx::query(
                    "UPDATE meta SET revision_id = revision_id + 1, generated_at = ? WHERE id = 1 RETURNING revision_id",
                )
                .bind(&now)
                .fetch_one(&self.pool),
            )
            .await?;
        Ok(row.get("revision_id"))
    }

    /// Store an asset and return its public URL.
    pub async fn upload_asset(
        &self,
        category: AssetCategory,
        upload: &AssetUpload,
    ) -> Result<String, AppError> {
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        let key = asset_key(
            &upload.file_name,
            Utc::now().timestamp_millis(),
            &nonce[..8],
        );
        let url = match tokio::time::timeout(self.timeout, self.assets.put(category, &key, upload))
            .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(AppError::Timeout(format!(
                    "Upload of {} did not complete within {:?}",
                    upload.file_name, self.timeout
                )))
            }
        };
        tracing::info!(
            category = category.as_str(),
            size = upload.bytes.len(),
            %url,
            "Asset uploaded"
        );
        Ok(url)
    }

    /// Delete an asset, logging instead of failing.
    pub async fn release_asset(&self, url: &str) {
        match tokio::time::timeout(self.timeout, self.assets.delete(url)).await {
            Ok(Ok(())) => tracing::info!(%url, "Asset released"),
            Ok(Err(e)) => tracing::warn!(%url, "Failed to release asset: {}", e),
            Err(_) => tracing::warn!(%url, timeout = ?self.timeout, "Asset release timed out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_gateway_with, MemoryAssetStore};

    fn png(name: &str) -> AssetUpload {
        AssetUpload {
            bytes: vec![0x89, b'P', b'N', b'G'],
            content_type: "image/png".to_string(),
            file_name: name.to_string(),
        }
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("logo.png"), "logo.png");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\tmp\\my bot.zip"), "my_bot.zip");
        assert_eq!(sanitize_file_name(".."), "file");
        assert_eq!(sanitize_file_name(""), "file");
    }

    #[test]
    fn test_asset_key_is_timestamp_qualified() {
        assert_eq!(
            asset_key("bot.zip", 1700000000000, "9f1c2ab0"),
            "1700000000000_9f1c2ab0_bot.zip"
        );
    }

    #[test]
    fn test_category_checks() {
        assert!(png("a.png").check_category(AssetCategory::Image).is_ok());
        assert!(png("a.png").check_category(AssetCategory::Archive).is_err());

        let zip = AssetUpload {
            bytes: vec![b'P', b'K'],
            content_type: "application/octet-stream".to_string(),
            file_name: "bot.ZIP".to_string(),
        };
        assert!(zip.check_category(AssetCategory::Archive).is_ok());

        let empty = AssetUpload {
            bytes: Vec::new(),
            ..png("empty.png")
        };
        assert!(matches!(
            empty.check_category(AssetCategory::Image),
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_upload_times_out() {
        let store = Arc::new(MemoryAssetStore::new().with_delay(Duration::from_millis(500)));
        let (gateway, _dir) = test_gateway_with(store, Duration::from_millis(50)).await;

        let err = gateway
            .upload_asset(AssetCategory::Image, &png("slow.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_same_name_uploads_get_distinct_objects() {
        let store = Arc::new(MemoryAssetStore::new());
        let (gateway, _dir) = test_gateway_with(store.clone(), Duration::from_secs(5)).await;

        let mut urls = Vec::new();
        for _ in 0..50 {
            urls.push(
                gateway
                    .upload_asset(AssetCategory::Image, &png("logo.png"))
                    .await
                    .unwrap(),
            );
        }

        assert_eq!(store.urls().len(), 50);
        gateway.release_asset(&urls[0]).await;
        assert!(!store.contains(&urls[0]));
        assert!(urls[1..].iter().all(|url| store.contains(url)));
    }

    #[tokio::test]
    async fn test_release_asset_swallows_failures() {
        let store = Arc::new(MemoryAssetStore::new());
        let (gateway, _dir) = test_gateway_with(store.clone(), Duration::from_secs(5)).await;

        let url = gateway
            .upload_asset(AssetCategory::Image, &png("logo.png"))
            .await
            .unwrap();
        store.fail_deletes_of(&url);

        gateway.release_asset(&url).await;
        assert!(store.contains(&url));
        assert_eq!(store.delete_attempts(), vec![url]);
    }

    #[tokio::test]
    async fn test_delete_row_is_idempotent_and_revision_bumps() {
        let (gateway, _dir) =
            test_gateway_with(Arc::new(MemoryAssetStore::new()), Duration::from_secs(5)).await;

        gateway.delete_row(Collection::Bots, "missing").await.unwrap();
        gateway.delete_row(Collection::Bots, "missing").await.unwrap();

        let before = gateway.current_revision().await.unwrap();
        let after = gateway.bump_revision().await.unwrap();
        assert_eq!(after, before + 1);
        assert_eq!(gateway.revision_info().await.unwrap().revision_id, after);
    }
}
